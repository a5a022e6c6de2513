//! Position lifecycle engine - paper-mode entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Position lifecycle and order reconciliation engine (paper mode)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via OCBOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Determine config path: CLI arg > OCBOT_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("OCBOT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = ocbot_bot::AppConfig::load(&config_path)?;

    ocbot_telemetry::init_logging_with(&config.telemetry.log_level)?;

    info!("Starting ocbot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config_path = %config_path,
        bots = config.bots.len(),
        threshold = ?config.reconcile.not_on_exchange_close_threshold,
        "Configuration loaded"
    );

    let app = ocbot_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
