//! Application configuration.
//!
//! Loaded from a TOML file layered with `OCBOT__`-prefixed environment
//! overrides (`OCBOT__RECONCILE__SYNC_INTERVAL_SECS=30`). Every section has
//! defaults, so an empty file yields a runnable (if idle) configuration.

use std::collections::HashSet;

use ocbot_core::{Bot, BotId, PositionSide, Strategy};
use ocbot_orders::OrdersConfig;
use ocbot_position::ReconcilerConfig;
use ocbot_queue::LifoConfig;
use ocbot_telemetry::DEFAULT_FILTER;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "OCBOT";

/// Trailing take-profit timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between trailing ticks. The step size is per whole minute, so
    /// ticking more often only shortens the lag.
    #[serde(default = "default_trailing_interval_secs")]
    pub interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_trailing_interval_secs() -> u64 {
    60
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_trailing_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Overrides `reconcile.log_throttle_window_ms` when set.
    #[serde(default)]
    pub log_throttle_window_ms: Option<u64>,
}

fn default_log_level() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_throttle_window_ms: None,
        }
    }
}

/// A position the paper exchange reports from startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPosition {
    pub bot_id: BotId,
    /// Exchange-native symbol.
    pub symbol: String,
    pub side: PositionSide,
    pub contracts: f64,
    pub entry_price: f64,
    /// Initial ticker; defaults to `entry_price`.
    #[serde(default)]
    pub mark_price: Option<f64>,
}

impl PaperPosition {
    pub fn ticker(&self) -> f64 {
        self.mark_price.unwrap_or(self.entry_price)
    }
}

/// Paper exchange seeding and fill simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Milliseconds between trigger-order fill checks.
    #[serde(default = "default_fill_interval_ms")]
    pub fill_interval_ms: u64,
    #[serde(default)]
    pub positions: Vec<PaperPosition>,
}

fn default_fill_interval_ms() -> u64 {
    1_000
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fill_interval_ms: default_fill_interval_ms(),
            positions: Vec::new(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub reconcile: ReconcilerConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    /// LIFO queue used for trailing recomputation.
    #[serde(default)]
    pub background: LifoConfig,
    #[serde(default)]
    pub trailing: TrailingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub bots: Vec<Bot>,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl AppConfig {
    /// Load `path` (optional on disk) plus environment overrides.
    pub fn load(path: &str) -> AppResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> AppResult<()> {
        if self.reconcile.sync_interval_secs == 0 {
            return Err(AppError::Config(
                "reconcile.sync_interval_secs must be positive".to_string(),
            ));
        }
        if self.orders.global_concurrency == 0 {
            return Err(AppError::Config(
                "orders.global_concurrency must be positive".to_string(),
            ));
        }
        if self.trailing.enabled && self.trailing.interval_secs == 0 {
            return Err(AppError::Config(
                "trailing.interval_secs must be positive".to_string(),
            ));
        }
        if self.paper.fill_interval_ms == 0 {
            return Err(AppError::Config(
                "paper.fill_interval_ms must be positive".to_string(),
            ));
        }

        let mut bots = HashSet::new();
        for bot in &self.bots {
            if !bots.insert(bot.id) {
                return Err(AppError::Config(format!("Duplicate bot id {}", bot.id)));
            }
        }
        for strategy in &self.strategies {
            if !bots.contains(&strategy.bot_id) {
                return Err(AppError::Config(format!(
                    "Strategy {} references unknown bot {}",
                    strategy.id, strategy.bot_id
                )));
            }
        }
        for seed in &self.paper.positions {
            if !bots.contains(&seed.bot_id) {
                return Err(AppError::Config(format!(
                    "Paper position {} references unknown bot {}",
                    seed.symbol, seed.bot_id
                )));
            }
            let valid = |v: f64| v.is_finite() && v > 0.0;
            if !valid(seed.contracts) || !valid(seed.entry_price) || !valid(seed.ticker()) {
                return Err(AppError::Config(format!(
                    "Paper position {} needs positive contracts and prices",
                    seed.symbol
                )));
            }
        }
        Ok(())
    }

    /// Reconciler settings with the telemetry throttle window applied.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let mut config = self.reconcile.clone();
        if let Some(window) = self.telemetry.log_throttle_window_ms {
            config.log_throttle_window_ms = window;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocbot_core::{ExchangeKind, StrategyId};
    use tokio_test::assert_err;

    const SAMPLE: &str = r#"
        [reconcile]
        sync_interval_secs = 30
        not_on_exchange_close_threshold = 3

        [orders]
        global_concurrency = 8

        [trailing]
        interval_secs = 15

        [telemetry]
        log_throttle_window_ms = 5000

        [[bots]]
        id = 1
        name = "paper-binance"
        exchange = "binance"
        max_concurrent_positions = 3

        [[strategies]]
        id = 10
        bot_id = 1
        symbol = "BTCUSDT"
        trade_type = "both"
        is_reverse = "1"
        oc = 2
        take_profit = 50
        stoploss = 20
        up_reduce = 10
        reduce = 10

        [[paper.positions]]
        bot_id = 1
        symbol = "BTCUSDT"
        side = "long"
        contracts = 0.5
        entry_price = 100.0
    "#;

    #[test]
    fn test_sample_config() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.reconcile.sync_interval_secs, 30);
        assert_eq!(config.reconcile.not_on_exchange_close_threshold, Some(3));
        assert_eq!(config.orders.global_concurrency, 8);
        assert_eq!(config.orders.per_bot_concurrency, 2);
        assert_eq!(config.trailing.interval_secs, 15);
        assert!(config.trailing.enabled);

        assert_eq!(config.bots.len(), 1);
        assert_eq!(config.bots[0].exchange, ExchangeKind::Binance);
        assert_eq!(config.bots[0].max_concurrent_positions, 3);
        assert!(config.bots[0].is_active);

        let strategy = &config.strategies[0];
        assert_eq!(strategy.id, StrategyId::new(10));
        assert!(strategy.is_reverse);
        assert_eq!(strategy.oc, 2.0);

        let seed = &config.paper.positions[0];
        assert_eq!(seed.side, PositionSide::Long);
        assert_eq!(seed.ticker(), 100.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.reconcile.not_on_exchange_close_threshold, None);
        assert_eq!(config.telemetry.log_level, DEFAULT_FILTER);
        assert_eq!(config.paper.fill_interval_ms, 1_000);
    }

    #[test]
    fn test_telemetry_window_overrides_reconciler() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.reconciler_config().log_throttle_window_ms, 5_000);
        assert_eq!(config.reconciler_config().sync_interval_secs, 30);

        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.reconciler_config().log_throttle_window_ms, 60_000);
    }

    #[test]
    fn test_rejects_unknown_bot_references() {
        let err = AppConfig::from_toml(
            r#"
            [[strategies]]
            id = 1
            bot_id = 9
            symbol = "BTCUSDT"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown bot 9"));
    }

    #[test]
    fn test_rejects_duplicate_bots_and_bad_seeds() {
        let duplicate = r#"
            [[bots]]
            id = 1
            exchange = "binance"
            [[bots]]
            id = 1
            exchange = "gate"
        "#;
        assert!(matches!(
            AppConfig::from_toml(duplicate),
            Err(AppError::Config(_))
        ));

        let bad_seed = r#"
            [[bots]]
            id = 1
            exchange = "mexc"
            [[paper.positions]]
            bot_id = 1
            symbol = "BTC_USDT"
            side = "short"
            contracts = 0.0
            entry_price = 100.0
        "#;
        assert!(matches!(
            AppConfig::from_toml(bad_seed),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let err = assert_err!(AppConfig::from_toml("[reconcile]\nsync_interval_secs = 0"));
        assert!(err.to_string().contains("sync_interval_secs"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ocbot-config-{}.toml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.bots[0].id, BotId::new(1));
        assert_eq!(config.strategies[0].take_profit, 50.0);
        assert_eq!(config.paper.positions[0].contracts, 0.5);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = AppConfig::load("/nonexistent/ocbot/config.toml").unwrap();
        assert!(config.bots.is_empty());
    }

    #[test]
    fn test_bundled_default_config_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert!(!config.bots.is_empty());
        assert!(!config.strategies.is_empty());
    }
}
