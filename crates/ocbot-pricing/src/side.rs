//! Map a candle direction and strategy polarity to a position side.

use ocbot_core::{parse_truthy, PositionSide, TradeType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Detected candle direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// Parse a direction label. Unknown labels yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullish" => Some(Self::Bullish),
            "bearish" => Some(Self::Bearish),
            _ => None,
        }
    }

    /// Candle direction from open and close.
    pub fn from_candle(open: f64, close: f64) -> Option<Self> {
        if !(open.is_finite() && close.is_finite()) || open == close {
            return None;
        }
        Some(if close > open {
            Self::Bullish
        } else {
            Self::Bearish
        })
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => f.write_str("bullish"),
            Self::Bearish => f.write_str("bearish"),
        }
    }
}

/// Side to open for `direction`, or `None` to skip.
///
/// Trend-following strategies trade with the move; reverse strategies trade
/// against it. The trade type then filters out a disallowed side.
pub fn determine_side(
    direction: Direction,
    trade_type: TradeType,
    is_reverse: bool,
) -> Option<PositionSide> {
    let side = match (direction, is_reverse) {
        (Direction::Bullish, false) | (Direction::Bearish, true) => PositionSide::Long,
        (Direction::Bearish, false) | (Direction::Bullish, true) => PositionSide::Short,
    };
    trade_type.allows(side).then_some(side)
}

/// [`determine_side`] over loosely typed inputs.
///
/// `is_reverse` may be a boolean, a number or a string; it is collapsed with
/// [`parse_truthy`]. Unrecognized directions or trade types yield `None`.
pub fn determine_side_raw(
    direction: &str,
    trade_type: &str,
    is_reverse: &Value,
) -> Option<PositionSide> {
    let direction = Direction::parse(direction)?;
    let trade_type = trade_type.parse::<TradeType>().ok()?;
    determine_side(direction, trade_type, parse_truthy(is_reverse))
}
