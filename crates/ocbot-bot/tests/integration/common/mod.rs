//! Shared fixtures: one Binance paper bot with a long BTCUSDT position.

use std::sync::Arc;
use std::time::Duration;

use ocbot_bot::{AppConfig, Application};
use ocbot_core::{ManualClock, Position};

pub const START_MS: u64 = 1_700_000_000_000;

pub const PAPER_CONFIG: &str = r#"
    [reconcile]
    not_on_exchange_close_threshold = 2

    [[bots]]
    id = 1
    name = "paper-binance"
    exchange = "binance"

    [[strategies]]
    id = 1
    bot_id = 1
    symbol = "BTCUSDT"
    oc = 2.0
    take_profit = 500.0
    stoploss = 50.0
    reduce = 10.0
    up_reduce = 10.0
    amount = 100.0

    [[paper.positions]]
    bot_id = 1
    symbol = "BTCUSDT"
    side = "long"
    contracts = 1.0
    entry_price = 100.0
"#;

pub fn paper_config() -> AppConfig {
    AppConfig::from_toml(PAPER_CONFIG).unwrap()
}

pub fn app(config: AppConfig) -> (Application, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let app = Application::with_clock(config, clock.clone()).unwrap();
    (app, clock)
}

/// Let scheduled placements run on the paused runtime.
pub async fn settle() {
    tokio::time::sleep(Duration::from_secs(1)).await;
}

pub fn positions(app: &Application) -> Vec<Position> {
    app.store().all_positions()
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
