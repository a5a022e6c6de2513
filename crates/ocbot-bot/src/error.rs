//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] ocbot_telemetry::TelemetryError),

    #[error("Reconcile error: {0}")]
    Position(#[from] ocbot_position::PositionError),

    #[error("Order error: {0}")]
    Order(#[from] ocbot_orders::OrderError),

    #[error("Store error: {0}")]
    Store(#[from] ocbot_store::StoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type AppResult<T> = Result<T, AppError>;
