//! Exchange client capability surface.

use std::fmt;
use std::sync::Arc;

use ocbot_core::{
    BoxFuture, ExchangeKind, ExchangeOrder, ExchangeOrderType, ExchangePosition, OrderSide,
    PositionSide,
};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// Exchange client operations, for call recording and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetOpenPositions,
    GetTickerPrice,
    GetOpenOrders,
    PlaceOrder,
    CancelOrder,
    ClosePosition,
    GetClosableQuantity,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetOpenPositions => "get_open_positions",
            Self::GetTickerPrice => "get_ticker_price",
            Self::GetOpenOrders => "get_open_orders",
            Self::PlaceOrder => "place_order",
            Self::CancelOrder => "cancel_order",
            Self::ClosePosition => "close_position",
            Self::GetClosableQuantity => "get_closable_quantity",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: ExchangeOrderType,
    pub side: OrderSide,
    /// Position the order acts on.
    pub position_side: PositionSide,
    pub quantity: f64,
    pub stop_price: Option<f64>,
    pub reduce_only: bool,
    pub close_position: bool,
}

impl OrderRequest {
    /// Reduce-only take-profit trigger for a position on `side`.
    pub fn take_profit(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self::exit(symbol, ExchangeOrderType::TakeProfitMarket, side, quantity, stop_price)
    }

    /// Reduce-only stop-loss trigger for a position on `side`.
    pub fn stop_loss(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self::exit(symbol, ExchangeOrderType::StopMarket, side, quantity, stop_price)
    }

    fn exit(
        symbol: impl Into<String>,
        order_type: ExchangeOrderType,
        side: PositionSide,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            order_type,
            side: side.closing_order_side(),
            position_side: side,
            quantity,
            stop_price: Some(stop_price),
            reduce_only: true,
            close_position: false,
        }
    }
}

/// Acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    /// Fill price for market orders, when known.
    pub avg_price: Option<f64>,
}

/// Per-bot exchange client.
///
/// Implementations translate venue payloads into the canonical shapes in
/// `ocbot_core` before returning. Transient failures surface as retryable
/// [`ExchangeError`](crate::ExchangeError)s.
pub trait ExchangeClient: Send + Sync {
    fn exchange(&self) -> ExchangeKind;

    /// Positions, optionally for one symbol. Zero-size entries may be returned.
    fn get_open_positions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<ExchangePosition>>>;

    fn get_ticker_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<f64>>;

    fn get_open_orders<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<ExchangeOrder>>>;

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<PlacedOrder>>;

    fn cancel_order<'a>(
        &'a self,
        order_id: &'a str,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<()>>;

    /// Market-close `amount` contracts of the position on `side`.
    fn close_position<'a>(
        &'a self,
        symbol: &'a str,
        side: PositionSide,
        amount: f64,
    ) -> BoxFuture<'a, ExchangeResult<PlacedOrder>>;

    /// Contracts that can currently be closed on `side`; zero when flat.
    fn get_closable_quantity<'a>(
        &'a self,
        symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, ExchangeResult<f64>>;
}

pub type SharedExchange = Arc<dyn ExchangeClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_requests_close_the_position_side() {
        let tp = OrderRequest::take_profit("BTCUSDT", PositionSide::Long, 0.5, 110.0);
        assert_eq!(tp.side, OrderSide::Sell);
        assert_eq!(tp.order_type, ExchangeOrderType::TakeProfitMarket);
        assert!(tp.reduce_only);

        let sl = OrderRequest::stop_loss("BTCUSDT", PositionSide::Short, 0.5, 110.0);
        assert_eq!(sl.side, OrderSide::Buy);
        assert_eq!(sl.stop_price, Some(110.0));
    }
}
