//! Store error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An active row already holds this `exchange_position_key`.
    #[error("Duplicate active position: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrency limit reached for bot {bot_id}: {max}")]
    LimitReached { bot_id: u64, max: usize },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
