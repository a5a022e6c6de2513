//! Error types for ocbot-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid exchange: {0}")]
    InvalidExchange(String),

    #[error("Invalid trade type: {0}")]
    InvalidTradeType(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
