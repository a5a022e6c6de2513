//! In-memory paper exchange.
//!
//! Holds a position book, tickers and resting trigger orders, and answers
//! the [`ExchangeClient`] surface by rendering them in the bot's venue
//! dialect and passing them through the same [`adapter`](crate::adapter)
//! functions a live client would use. Every call is recorded, and failures
//! can be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use ocbot_core::{
    normalize_symbol, BoxFuture, ExchangeKind, ExchangeOrder, ExchangeOrderType,
    ExchangePosition, OrderSide, PositionSide, SharedClock,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::adapter::{parse_orders, parse_positions};
use crate::client::{ExchangeClient, Operation, OrderRequest, PlacedOrder};
use crate::error::{ExchangeError, ExchangeErrorKind, ExchangeResult};

/// A recorded client call.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperCall {
    GetOpenPositions { symbol: Option<String> },
    GetTickerPrice { symbol: String },
    GetOpenOrders { symbol: Option<String> },
    PlaceOrder(OrderRequest),
    CancelOrder { order_id: String, symbol: String },
    ClosePosition { symbol: String, side: PositionSide, amount: f64 },
    GetClosableQuantity { symbol: String, side: PositionSide },
}

impl PaperCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::GetOpenPositions { .. } => Operation::GetOpenPositions,
            Self::GetTickerPrice { .. } => Operation::GetTickerPrice,
            Self::GetOpenOrders { .. } => Operation::GetOpenOrders,
            Self::PlaceOrder(_) => Operation::PlaceOrder,
            Self::CancelOrder { .. } => Operation::CancelOrder,
            Self::ClosePosition { .. } => Operation::ClosePosition,
            Self::GetClosableQuantity { .. } => Operation::GetClosableQuantity,
        }
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    symbol: String,
    side: PositionSide,
    contracts: f64,
    entry_price: f64,
    mark_price: Option<f64>,
}

#[derive(Debug, Default)]
struct Book {
    /// (normalized symbol, side) -> position
    positions: BTreeMap<(String, PositionSide), PaperPosition>,
    /// normalized symbol -> last price
    tickers: HashMap<String, f64>,
    orders: Vec<ExchangeOrder>,
    next_order_id: u64,
    last_order_ms: u64,
}

impl Book {
    fn next_id(&mut self) -> String {
        self.next_order_id += 1;
        (1_000 + self.next_order_id).to_string()
    }

    fn price_of(&self, normalized: &str) -> Option<f64> {
        self.tickers.get(normalized).copied().or_else(|| {
            self.positions
                .values()
                .find(|p| normalize_symbol(&p.symbol) == normalized)
                .map(|p| p.mark_price.unwrap_or(p.entry_price))
        })
    }

    fn open_contracts(&self, normalized: &str, side: PositionSide) -> f64 {
        self.positions
            .get(&(normalized.to_string(), side))
            .map(|p| p.contracts)
            .unwrap_or(0.0)
    }
}

/// Check if a trigger order at `stop` fires at `price`.
fn crosses(order_type: &ExchangeOrderType, side: PositionSide, stop: f64, price: f64) -> bool {
    match (order_type, side) {
        (ExchangeOrderType::TakeProfitMarket, PositionSide::Long) => price >= stop,
        (ExchangeOrderType::TakeProfitMarket, PositionSide::Short) => price <= stop,
        (ExchangeOrderType::StopMarket, PositionSide::Long) => price <= stop,
        (ExchangeOrderType::StopMarket, PositionSide::Short) => price >= stop,
        _ => false,
    }
}

/// In-memory exchange for tests and paper trading.
pub struct PaperExchange {
    exchange: ExchangeKind,
    clock: SharedClock,
    latency: Option<Duration>,
    book: Mutex<Book>,
    calls: Mutex<Vec<PaperCall>>,
    fail_next: Mutex<HashMap<Operation, VecDeque<ExchangeError>>>,
    fail_always: Mutex<HashMap<Operation, ExchangeError>>,
}

impl PaperExchange {
    pub fn new(exchange: ExchangeKind, clock: SharedClock) -> Self {
        Self {
            exchange,
            clock,
            latency: None,
            book: Mutex::new(Book::default()),
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(HashMap::new()),
            fail_always: Mutex::new(HashMap::new()),
        }
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // ========================================================================
    // Book setup
    // ========================================================================

    /// Create or replace a position. Zero contracts leaves a flat slot that
    /// is still reported.
    pub fn set_position(&self, symbol: &str, side: PositionSide, contracts: f64, entry_price: f64) {
        let mut book = self.book.lock();
        let normalized = normalize_symbol(symbol);
        let mark_price = book.tickers.get(&normalized).copied();
        book.positions.insert(
            (normalized, side),
            PaperPosition {
                symbol: symbol.to_string(),
                side,
                contracts: contracts.abs(),
                entry_price,
                mark_price,
            },
        );
    }

    /// Set a position's size to zero, as if closed outside the engine.
    pub fn flatten(&self, symbol: &str, side: PositionSide) {
        let mut book = self.book.lock();
        if let Some(pos) = book.positions.get_mut(&(normalize_symbol(symbol), side)) {
            pos.contracts = 0.0;
        }
    }

    /// Drop a position row entirely, as a one-way-mode venue does.
    pub fn remove_position(&self, symbol: &str, side: PositionSide) {
        self.book
            .lock()
            .positions
            .remove(&(normalize_symbol(symbol), side));
    }

    /// Set the last price and mark price for a symbol.
    pub fn set_ticker(&self, symbol: &str, price: f64) {
        let mut book = self.book.lock();
        let normalized = normalize_symbol(symbol);
        for ((sym, _), pos) in book.positions.iter_mut() {
            if *sym == normalized {
                pos.mark_price = Some(price);
            }
        }
        book.tickers.insert(normalized, price);
    }

    /// Rest an order on the book without going through `place_order`.
    pub fn add_open_order(&self, order: ExchangeOrder) {
        let mut book = self.book.lock();
        book.last_order_ms = book.last_order_ms.max(order.time_ms);
        book.orders.push(order);
    }

    pub fn position(&self, symbol: &str, side: PositionSide) -> Option<ExchangePosition> {
        let book = self.book.lock();
        book.positions
            .get(&(normalize_symbol(symbol), side))
            .map(|p| {
                ExchangePosition::new(&p.symbol, p.side, p.contracts)
                    .with_prices(Some(p.entry_price), p.mark_price)
            })
    }

    pub fn open_orders(&self) -> Vec<ExchangeOrder> {
        self.book.lock().orders.clone()
    }

    /// Symbols with a position row.
    pub fn symbols(&self) -> Vec<String> {
        let book = self.book.lock();
        let mut symbols: Vec<String> = book.positions.values().map(|p| p.symbol.clone()).collect();
        symbols.dedup();
        symbols
    }

    /// Fill every resting trigger order crossed by the current tickers.
    ///
    /// A fill flattens the position side and removes that side's remaining
    /// exit orders. Returns the ids of the orders that fired.
    pub fn trigger_exit_orders(&self) -> Vec<String> {
        let mut book = self.book.lock();
        let mut fired: Vec<(String, String, PositionSide)> = Vec::new();

        for order in &book.orders {
            let Some(stop) = order.stop_price else {
                continue;
            };
            let side = order.protected_side();
            let Some(price) = book.tickers.get(&order.normalized_symbol).copied() else {
                continue;
            };
            let already = fired
                .iter()
                .any(|(_, sym, s)| *sym == order.normalized_symbol && *s == side);
            if !already && crosses(&order.order_type, side, stop, price) {
                fired.push((order.order_id.clone(), order.normalized_symbol.clone(), side));
            }
        }

        for (order_id, symbol, side) in &fired {
            if let Some(pos) = book.positions.get_mut(&(symbol.clone(), *side)) {
                pos.contracts = 0.0;
            }
            book.orders.retain(|o| {
                !(o.is_exit_order() && o.normalized_symbol == *symbol && o.protected_side() == *side)
            });
            info!(order_id = %order_id, symbol = %symbol, side = %side, "Paper exit order filled");
        }
        fired.into_iter().map(|(id, _, _)| id).collect()
    }

    // ========================================================================
    // Recording and failure injection
    // ========================================================================

    pub fn calls(&self) -> Vec<PaperCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Fail the next call of `operation` with `error`.
    pub fn fail_next(&self, operation: Operation, error: ExchangeError) {
        self.fail_next
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `operation` until cleared.
    pub fn fail_always(&self, operation: Operation, error: ExchangeError) {
        self.fail_always.lock().insert(operation, error);
    }

    pub fn clear_failures(&self) {
        self.fail_next.lock().clear();
        self.fail_always.lock().clear();
    }

    async fn enter(&self, call: PaperCall) -> ExchangeResult<()> {
        let operation = call.operation();
        self.calls.lock().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self
            .fail_next
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        if let Some(err) = self.fail_always.lock().get(&operation) {
            return Err(err.clone());
        }
        Ok(())
    }

    // ========================================================================
    // Venue rendering
    // ========================================================================

    fn render_position(&self, pos: &PaperPosition) -> Value {
        let signed = pos.contracts * pos.side.sign();
        let position_type = match pos.side {
            PositionSide::Long => 1,
            PositionSide::Short => 2,
        };
        match self.exchange {
            ExchangeKind::Binance => json!({
                "symbol": pos.symbol,
                "positionAmt": signed.to_string(),
                "entryPrice": pos.entry_price.to_string(),
                "markPrice": pos.mark_price.map(|p| p.to_string()),
                "positionSide": pos.side.as_str().to_ascii_uppercase(),
            }),
            ExchangeKind::Mexc => json!({
                "symbol": pos.symbol,
                "holdVol": pos.contracts,
                "holdAvgPrice": pos.entry_price,
                "markPrice": pos.mark_price,
                "positionType": position_type,
            }),
            ExchangeKind::Gate => json!({
                "contract": pos.symbol,
                "size": signed,
                "entry_price": pos.entry_price.to_string(),
                "mark_price": pos.mark_price.map(|p| p.to_string()),
                "mode": format!("dual_{}", pos.side.as_str()),
            }),
        }
    }

    fn render_order(&self, order: &ExchangeOrder) -> Value {
        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let position_side = order
            .position_side
            .map(|s| s.as_str().to_ascii_uppercase())
            .unwrap_or_else(|| "BOTH".to_string());
        let numeric_id = order
            .order_id
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(order.order_id.clone()));
        match self.exchange {
            ExchangeKind::Binance => json!({
                "orderId": numeric_id,
                "symbol": order.symbol,
                "type": order.order_type.as_str(),
                "side": side,
                "positionSide": position_side,
                "reduceOnly": order.reduce_only,
                "closePosition": order.close_position,
                "stopPrice": order.stop_price.map(|p| p.to_string()),
                "time": order.time_ms,
            }),
            ExchangeKind::Mexc | ExchangeKind::Gate => json!({
                "id": order.order_id,
                "symbol": order.symbol,
                "type": order.order_type.as_str().to_ascii_lowercase(),
                "side": side.to_ascii_lowercase(),
                "positionSide": position_side.to_ascii_lowercase(),
                "reduceOnly": order.reduce_only,
                "closePosition": order.close_position,
                "triggerPrice": order.stop_price,
                "timestamp": order.time_ms,
            }),
        }
    }

    fn place(&self, request: &OrderRequest) -> ExchangeResult<PlacedOrder> {
        let mut book = self.book.lock();
        let normalized = normalize_symbol(&request.symbol);
        let side = request.position_side;
        let open = book.open_contracts(&normalized, side);

        if request.order_type == ExchangeOrderType::Market {
            let price = book.price_of(&normalized).ok_or_else(|| {
                ExchangeError::new(ExchangeErrorKind::InvalidSymbol, "no price for symbol")
            })?;
            if request.reduce_only {
                if open <= 0.0 {
                    return Err(ExchangeError::classify(Some(-2022), "ReduceOnly Order is rejected."));
                }
                if let Some(pos) = book.positions.get_mut(&(normalized.clone(), side)) {
                    pos.contracts = (pos.contracts - request.quantity).max(0.0);
                }
            } else {
                let pos = book
                    .positions
                    .entry((normalized.clone(), side))
                    .or_insert_with(|| PaperPosition {
                        symbol: request.symbol.clone(),
                        side,
                        contracts: 0.0,
                        entry_price: price,
                        mark_price: Some(price),
                    });
                let total = pos.contracts + request.quantity;
                pos.entry_price = (pos.entry_price * pos.contracts + price * request.quantity) / total;
                pos.contracts = total;
            }
            let order_id = book.next_id();
            return Ok(PlacedOrder {
                order_id,
                avg_price: Some(price),
            });
        }

        if (request.reduce_only || request.close_position) && open <= 0.0 {
            return Err(ExchangeError::classify(Some(-2022), "ReduceOnly Order is rejected."));
        }
        if let (Some(stop), Some(price)) = (request.stop_price, book.price_of(&normalized)) {
            if crosses(&request.order_type, side, stop, price) {
                return Err(ExchangeError::classify(
                    Some(-2021),
                    "Order would immediately trigger.",
                ));
            }
        }

        let order_id = book.next_id();
        let time_ms = self.clock.now_ms().max(book.last_order_ms + 1);
        book.last_order_ms = time_ms;
        book.orders.push(ExchangeOrder {
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            normalized_symbol: normalized,
            order_type: request.order_type.clone(),
            side: request.side,
            position_side: Some(side),
            reduce_only: request.reduce_only,
            close_position: request.close_position,
            stop_price: request.stop_price,
            time_ms,
        });
        debug!(order_id = %order_id, symbol = %request.symbol, order_type = %request.order_type, "Paper order resting");
        Ok(PlacedOrder {
            order_id,
            avg_price: None,
        })
    }
}

impl ExchangeClient for PaperExchange {
    fn exchange(&self) -> ExchangeKind {
        self.exchange
    }

    fn get_open_positions<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<ExchangePosition>>> {
        Box::pin(async move {
            self.enter(PaperCall::GetOpenPositions {
                symbol: symbol.map(str::to_string),
            })
            .await?;
            let wanted = symbol.map(normalize_symbol);
            let payload = {
                let book = self.book.lock();
                Value::Array(
                    book.positions
                        .iter()
                        .filter(|((sym, _), _)| wanted.as_ref().map_or(true, |w| w == sym))
                        .map(|(_, pos)| self.render_position(pos))
                        .collect(),
                )
            };
            Ok(parse_positions(self.exchange, &payload))
        })
    }

    fn get_ticker_price<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            self.enter(PaperCall::GetTickerPrice {
                symbol: symbol.to_string(),
            })
            .await?;
            self.book
                .lock()
                .price_of(&normalize_symbol(symbol))
                .ok_or_else(|| ExchangeError::classify(Some(-1121), "Invalid symbol."))
        })
    }

    fn get_open_orders<'a>(
        &'a self,
        symbol: Option<&'a str>,
    ) -> BoxFuture<'a, ExchangeResult<Vec<ExchangeOrder>>> {
        Box::pin(async move {
            self.enter(PaperCall::GetOpenOrders {
                symbol: symbol.map(str::to_string),
            })
            .await?;
            let wanted = symbol.map(normalize_symbol);
            let payload = {
                let book = self.book.lock();
                Value::Array(
                    book.orders
                        .iter()
                        .filter(|o| wanted.as_ref().map_or(true, |w| *w == o.normalized_symbol))
                        .map(|o| self.render_order(o))
                        .collect(),
                )
            };
            Ok(parse_orders(self.exchange, &payload))
        })
    }

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<PlacedOrder>> {
        Box::pin(async move {
            self.enter(PaperCall::PlaceOrder(request.clone())).await?;
            self.place(&request)
        })
    }

    fn cancel_order<'a>(
        &'a self,
        order_id: &'a str,
        symbol: &'a str,
    ) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move {
            self.enter(PaperCall::CancelOrder {
                order_id: order_id.to_string(),
                symbol: symbol.to_string(),
            })
            .await?;
            let mut book = self.book.lock();
            let before = book.orders.len();
            book.orders.retain(|o| o.order_id != order_id);
            if book.orders.len() == before {
                return Err(ExchangeError::classify(Some(-2011), "Unknown order sent."));
            }
            Ok(())
        })
    }

    fn close_position<'a>(
        &'a self,
        symbol: &'a str,
        side: PositionSide,
        amount: f64,
    ) -> BoxFuture<'a, ExchangeResult<PlacedOrder>> {
        Box::pin(async move {
            self.enter(PaperCall::ClosePosition {
                symbol: symbol.to_string(),
                side,
                amount,
            })
            .await?;
            let mut book = self.book.lock();
            let normalized = normalize_symbol(symbol);
            let price = book.price_of(&normalized);
            let pos = book
                .positions
                .get_mut(&(normalized, side))
                .filter(|p| p.contracts > 0.0)
                .ok_or_else(|| ExchangeError::position_not_found("Position not found"))?;
            let qty = if amount > 0.0 {
                amount.min(pos.contracts)
            } else {
                pos.contracts
            };
            pos.contracts -= qty;
            let order_id = book.next_id();
            info!(symbol, side = %side, qty, "Paper position closed at market");
            Ok(PlacedOrder {
                order_id,
                avg_price: price,
            })
        })
    }

    fn get_closable_quantity<'a>(
        &'a self,
        symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            self.enter(PaperCall::GetClosableQuantity {
                symbol: symbol.to_string(),
                side,
            })
            .await?;
            Ok(self.book.lock().open_contracts(&normalize_symbol(symbol), side))
        })
    }
}
