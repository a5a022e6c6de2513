//! Identifiers and small enums shared across the engine.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Exchange account ("bot") identifier.
    BotId
);
numeric_id!(
    /// Local position row identifier.
    PositionId
);
numeric_id!(
    /// Strategy row identifier.
    StrategyId
);

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns 1.0 for long, -1.0 for short (for PnL calculations).
    pub fn sign(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// Order side that reduces a position on this side.
    pub fn closing_order_side(&self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Sell,
            Self::Short => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "long",
            Self::Short => "short",
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Position side this order closes when sent reduce-only.
    pub fn closes(&self) -> PositionSide {
        match self {
            Self::Sell => PositionSide::Long,
            Self::Buy => PositionSide::Short,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    EntryPending,
    Open,
    TpPending,
    Closed,
    Cancelled,
}

impl PositionStatus {
    /// Statuses covered by the one-row-per-(bot, symbol, side) invariant.
    pub const ACTIVE: [PositionStatus; 3] = [Self::EntryPending, Self::Open, Self::TpPending];

    /// Check if this status counts as an active (non-terminal) position.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::EntryPending | Self::Open | Self::TpPending)
    }

    /// Check if the position is expected to exist on the exchange.
    pub fn expects_exchange_position(&self) -> bool {
        matches!(self, Self::Open | Self::TpPending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryPending => "entry_pending",
            Self::Open => "open",
            Self::TpPending => "tp_pending",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry_pending" => Ok(Self::EntryPending),
            "open" => Ok(Self::Open),
            "tp_pending" => Ok(Self::TpPending),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Why a position row was closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Exchange reports zero size for a row still open locally.
    SyncExchangeClosed,
    /// Row was absent from the exchange for too many consecutive cycles.
    SyncNotOnExchange,
    /// Closed by a path outside the engine (fill handler, operator script).
    Other(String),
}

impl CloseReason {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SyncExchangeClosed => "sync_exchange_closed",
            Self::SyncNotOnExchange => "sync_not_on_exchange",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for CloseReason {
    fn from(s: &str) -> Self {
        match s {
            "sync_exchange_closed" => Self::SyncExchangeClosed,
            "sync_not_on_exchange" => Self::SyncNotOnExchange,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Exchange venue a bot trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Binance,
    Mexc,
    Gate,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Mexc => "mexc",
            Self::Gate => "gate",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "mexc" => Ok(Self::Mexc),
            "gate" | "gateio" => Ok(Self::Gate),
            other => Err(CoreError::InvalidExchange(other.to_string())),
        }
    }
}
