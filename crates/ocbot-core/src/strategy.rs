//! Strategy and bot definitions.

use crate::error::CoreError;
use crate::flag::deserialize_truthy;
use crate::symbol::normalize_symbol;
use crate::types::{BotId, ExchangeKind, PositionSide, StrategyId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which directions a strategy may trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Long,
    Short,
    #[default]
    Both,
}

impl TradeType {
    /// Check if a position on `side` is permitted.
    pub fn allows(&self, side: PositionSide) -> bool {
        match self {
            Self::Both => true,
            Self::Long => side == PositionSide::Long,
            Self::Short => side == PositionSide::Short,
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for TradeType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            "both" => Ok(Self::Both),
            other => Err(CoreError::InvalidTradeType(other.to_string())),
        }
    }
}

/// A trading strategy bound to one bot and one symbol.
///
/// Take-profit and stop-loss parameters are stored per-mille of the
/// strategy's `oc` threshold (e.g. `take_profit = 50` means 5% of `oc`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub bot_id: BotId,
    /// Exchange-native symbol.
    pub symbol: String,
    #[serde(default)]
    pub trade_type: TradeType,
    /// Trade counter to detected direction.
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub is_reverse: bool,
    /// Observed-change threshold in percent.
    #[serde(default)]
    pub oc: f64,
    /// Entry extension in percent of the candle move.
    #[serde(default)]
    pub extend: f64,
    /// Take-profit parameter (per-mille).
    #[serde(default)]
    pub take_profit: f64,
    /// Stop-loss parameter (per-mille); zero disables the initial stop.
    #[serde(default)]
    pub stoploss: f64,
    /// Trailing decay per minute (percent of range) for short positions.
    #[serde(default)]
    pub reduce: f64,
    /// Trailing decay per minute (percent of range) for long positions.
    #[serde(default)]
    pub up_reduce: f64,
    /// Position notional in quote currency.
    #[serde(default)]
    pub amount: f64,
    #[serde(default = "default_true", deserialize_with = "deserialize_truthy")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Strategy {
    pub fn normalized_symbol(&self) -> String {
        normalize_symbol(&self.symbol)
    }

    /// Trailing decay percent per minute for a position on `side`.
    pub fn trailing_decay(&self, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => self.up_reduce,
            PositionSide::Short => self.reduce,
        }
    }
}

/// An exchange account the engine trades through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    #[serde(default)]
    pub name: String,
    pub exchange: ExchangeKind,
    #[serde(default = "default_true", deserialize_with = "deserialize_truthy")]
    pub is_active: bool,
    /// Maximum concurrent non-closed positions.
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
    /// When set, stop losses are sized so hitting them loses this many USD.
    #[serde(default)]
    pub risk_amount_usd: Option<f64>,
}

fn default_max_concurrent_positions() -> usize {
    5
}
