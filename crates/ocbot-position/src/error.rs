//! Reconciler error types.

use ocbot_core::BotId;
use ocbot_exchange::ExchangeError;
use ocbot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PositionError {
    /// The bot's positions could not be read; the bot is skipped this cycle.
    #[error("Position fetch failed for bot {bot_id}: {source}")]
    Fetch {
        bot_id: BotId,
        #[source]
        source: ExchangeError,
    },

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No exchange client registered for bot {0}")]
    NoExchange(BotId),
}

pub type PositionResult<T> = Result<T, PositionError>;
