//! Entry orders and concurrency reservations.

use crate::types::{BotId, PositionSide, StrategyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entry order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryOrderStatus {
    Open,
    Filled,
    Canceled,
    Expired,
}

impl EntryOrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Handle for one consumed slot against a bot's concurrent-position limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationToken(String);

impl ReservationToken {
    /// Create a new unique token.
    ///
    /// Format: `rsv_{bot_id}_{uuid_short}`
    pub fn new(bot_id: BotId) -> Self {
        let uuid_short = &Uuid::new_v4().simple().to_string()[..12];
        Self(format!("rsv_{bot_id}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservation lifecycle. A token is finalized exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Released,
    Cancelled,
}

/// A slot against a bot's maximum concurrent positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyReservation {
    pub token: ReservationToken,
    pub bot_id: BotId,
    pub status: ReservationStatus,
    pub created_at_ms: u64,
    pub finalized_at_ms: Option<u64>,
}

/// Intent to open a position, placed on the exchange and awaiting fill.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub id: u64,
    pub strategy_id: StrategyId,
    pub bot_id: BotId,
    /// Exchange order id (unique).
    pub order_id: String,
    /// Exchange-native symbol.
    pub symbol: String,
    pub normalized_symbol: String,
    pub side: PositionSide,
    /// Notional in quote currency.
    pub amount: f64,
    /// Contract quantity.
    pub quantity: f64,
    pub entry_price: f64,
    pub status: EntryOrderStatus,
    pub reservation_token: Option<ReservationToken>,
    pub created_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_token_unique_and_prefixed() {
        let a = ReservationToken::new(BotId::new(4));
        let b = ReservationToken::new(BotId::new(4));
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("rsv_4_"));
    }

    #[test]
    fn test_entry_status_terminal() {
        assert!(!EntryOrderStatus::Open.is_terminal());
        assert!(EntryOrderStatus::Filled.is_terminal());
        assert!(EntryOrderStatus::Expired.is_terminal());
    }
}
