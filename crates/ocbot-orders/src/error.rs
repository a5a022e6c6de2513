//! Order scheduling error types.

use ocbot_core::{PositionId, Retryable};
use ocbot_exchange::ExchangeError;
use ocbot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Position not found: {0}")]
    PositionNotFound(PositionId),

    /// Exchange reports nothing to close for a row the store thinks is open.
    #[error("Ghost position {0}: nothing closable on exchange")]
    GhostPosition(PositionId),

    /// Versioned write kept losing; the work is stale.
    #[error("Position {0} changed concurrently; abandoning")]
    StaleVersion(PositionId),

    #[error("Coordinator shut down")]
    Shutdown,
}

impl Retryable for OrderError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Exchange(err) => err.is_retryable(),
            Self::Store(StoreError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
