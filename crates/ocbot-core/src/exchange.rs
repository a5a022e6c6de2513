//! Canonical exchange-side shapes.
//!
//! Adapters translate each venue's payloads into these types once, at the
//! collaborator boundary. The reconciler and the order scheduler never see
//! exchange-specific field names.

use crate::symbol::normalize_symbol;
use crate::types::{OrderSide, PositionSide};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    /// Exchange-native symbol.
    pub symbol: String,
    pub normalized_symbol: String,
    pub side: PositionSide,
    /// Absolute size in contracts. Zero means the exchange reports the slot as flat.
    pub contracts: f64,
    pub entry_price: Option<f64>,
    pub mark_price: Option<f64>,
    pub unrealized_pnl: Option<f64>,
}

impl ExchangePosition {
    pub fn new(symbol: impl Into<String>, side: PositionSide, contracts: f64) -> Self {
        let symbol = symbol.into();
        Self {
            normalized_symbol: normalize_symbol(&symbol),
            symbol,
            side,
            contracts: contracts.abs(),
            entry_price: None,
            mark_price: None,
            unrealized_pnl: None,
        }
    }

    #[must_use]
    pub fn with_prices(mut self, entry_price: Option<f64>, mark_price: Option<f64>) -> Self {
        self.entry_price = entry_price;
        self.mark_price = mark_price;
        self
    }

    pub fn is_flat(&self) -> bool {
        !(self.contracts.is_finite() && self.contracts > 0.0)
    }

    /// Best available reference price: entry, else mark.
    pub fn reference_price(&self) -> Option<f64> {
        self.entry_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .or(self.mark_price.filter(|p| p.is_finite() && *p > 0.0))
    }
}

/// Order type as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeOrderType {
    Limit,
    Market,
    TakeProfitMarket,
    StopMarket,
    Other(String),
}

impl ExchangeOrderType {
    /// Parse the wire spelling (`TAKE_PROFIT_MARKET`, `stop_market`, ...).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "LIMIT" => Self::Limit,
            "MARKET" => Self::Market,
            "TAKE_PROFIT_MARKET" => Self::TakeProfitMarket,
            "STOP_MARKET" => Self::StopMarket,
            other => Self::Other(other.to_string()),
        }
    }

    /// Take-profit or stop-loss trigger order types.
    pub fn is_exit_type(&self) -> bool {
        matches!(self, Self::TakeProfitMarket | Self::StopMarket)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Limit => "LIMIT",
            Self::Market => "MARKET",
            Self::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            Self::StopMarket => "STOP_MARKET",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ExchangeOrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: String,
    /// Exchange-native symbol.
    pub symbol: String,
    pub normalized_symbol: String,
    pub order_type: ExchangeOrderType,
    pub side: OrderSide,
    /// Hedge-mode position side; `None` in one-way mode.
    pub position_side: Option<PositionSide>,
    pub reduce_only: bool,
    pub close_position: bool,
    pub stop_price: Option<f64>,
    /// Placement time (Unix ms).
    pub time_ms: u64,
}

impl ExchangeOrder {
    /// Reduce-only TP/SL trigger order.
    pub fn is_exit_order(&self) -> bool {
        self.order_type.is_exit_type() && (self.reduce_only || self.close_position)
    }

    /// Position side this order protects.
    ///
    /// Uses the hedge-mode position side when present, otherwise infers it from
    /// the order side (a sell closes a long).
    pub fn protected_side(&self) -> PositionSide {
        self.position_side.unwrap_or_else(|| self.side.closes())
    }
}
