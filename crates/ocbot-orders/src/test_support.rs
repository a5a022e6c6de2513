//! Shared fixtures for order tests.

use std::collections::VecDeque;
use std::sync::Arc;

use ocbot_core::{
    Bot, BotId, BoxFuture, EntryOrder, EntryOrderStatus, ExchangeKind, ManualClock, NewPosition,
    Position, PositionId, PositionSide, PositionStatus, ReservationStatus, ReservationToken,
    Strategy, StrategyId, TradeType,
};
use ocbot_exchange::{PaperExchange, SharedExchange};
use ocbot_store::{MemoryStore, PositionStore, SharedStore, StoreResult, UpdateOutcome};
use parking_lot::Mutex;

use crate::config::OrdersConfig;
use crate::exit_placer::ExitOrderPlacer;

pub(crate) const START_MS: u64 = 1_700_000_000_000;

pub(crate) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub exchange: Arc<PaperExchange>,
}

pub(crate) fn strategy() -> Strategy {
    Strategy {
        id: StrategyId::new(1),
        bot_id: BotId::new(1),
        symbol: "BTCUSDT".to_string(),
        trade_type: TradeType::Both,
        is_reverse: false,
        oc: 2.0,
        extend: 0.0,
        take_profit: 500.0,
        stoploss: 50.0,
        reduce: 10.0,
        up_reduce: 10.0,
        amount: 100.0,
        is_active: true,
    }
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        store.insert_bot(Bot {
            id: BotId::new(1),
            name: "paper-1".to_string(),
            exchange: ExchangeKind::Binance,
            is_active: true,
            max_concurrent_positions: 5,
            risk_amount_usd: None,
        });
        store.insert_strategy(strategy());
        let exchange = Arc::new(PaperExchange::new(ExchangeKind::Binance, clock.clone()));
        Self {
            clock,
            store,
            exchange,
        }
    }

    pub fn shared_store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn shared_exchange(&self) -> SharedExchange {
        self.exchange.clone()
    }

    pub fn placer(&self) -> Arc<ExitOrderPlacer> {
        Arc::new(ExitOrderPlacer::new(
            self.shared_store(),
            self.clock.clone(),
            &OrdersConfig::default(),
        ))
    }

    /// Open position on both the store and the paper exchange, ticker at entry.
    pub async fn open_position(&self, side: PositionSide, entry: f64, quantity: f64) -> Position {
        self.exchange.set_position("BTCUSDT", side, quantity, entry);
        self.exchange.set_ticker("BTCUSDT", entry);
        self.store
            .insert_position(NewPosition {
                bot_id: BotId::new(1),
                strategy_id: Some(StrategyId::new(1)),
                exchange: ExchangeKind::Binance,
                symbol: "BTCUSDT".to_string(),
                side,
                entry_price: entry,
                amount: entry * quantity,
                quantity,
                status: PositionStatus::Open,
                entry_order_id: None,
                tp_price: None,
                stop_loss_price: None,
                current_reduce: None,
                reservation_token: None,
                opened_at_ms: START_MS,
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, position: &Position) -> Position {
        self.store
            .get_position(position.id)
            .await
            .unwrap()
            .unwrap()
    }
}

type Race = Box<dyn FnOnce(&mut Position) + Send>;

/// Store whose position writes can be made to lose a race.
///
/// Each `update_position` consumes one scripted step. A `race` step first
/// lets a competing writer change the stored row, so the write arrives
/// with a stale version and conflicts. Unscripted writes pass through.
pub(crate) struct RacingStore {
    inner: Arc<MemoryStore>,
    script: Mutex<VecDeque<Option<Race>>>,
}

impl RacingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            script: Mutex::new(VecDeque::new()),
        })
    }

    /// Next write goes through untouched.
    pub fn pass(&self) {
        self.script.lock().push_back(None);
    }

    /// Next write loses to a competitor applying `change`.
    pub fn race(&self, change: impl FnOnce(&mut Position) + Send + 'static) {
        self.script.lock().push_back(Some(Box::new(change)));
    }
}

impl PositionStore for RacingStore {
    fn active_positions(&self, bot_id: BotId) -> BoxFuture<'_, StoreResult<Vec<Position>>> {
        self.inner.active_positions(bot_id)
    }

    fn find_active<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<Position>>> {
        self.inner.find_active(bot_id, normalized_symbol, side)
    }

    fn get_position(&self, id: PositionId) -> BoxFuture<'_, StoreResult<Option<Position>>> {
        self.inner.get_position(id)
    }

    fn insert_position(&self, new: NewPosition) -> BoxFuture<'_, StoreResult<Position>> {
        self.inner.insert_position(new)
    }

    fn update_position(&self, position: Position) -> BoxFuture<'_, StoreResult<UpdateOutcome>> {
        Box::pin(async move {
            let race = self.script.lock().pop_front().flatten();
            if let Some(change) = race {
                if let Some(mut current) = self.inner.get_position(position.id).await? {
                    change(&mut current);
                    self.inner.update_position(current).await?;
                }
            }
            self.inner.update_position(position).await
        })
    }

    fn find_open_entry_order<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
        side: PositionSide,
    ) -> BoxFuture<'a, StoreResult<Option<EntryOrder>>> {
        self.inner.find_open_entry_order(bot_id, normalized_symbol, side)
    }

    fn set_entry_order_status(
        &self,
        entry_id: u64,
        status: EntryOrderStatus,
    ) -> BoxFuture<'_, StoreResult<()>> {
        self.inner.set_entry_order_status(entry_id, status)
    }

    fn finalize_reservation<'a>(
        &'a self,
        token: &'a ReservationToken,
        status: ReservationStatus,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        self.inner.finalize_reservation(token, status)
    }

    fn find_active_strategy<'a>(
        &'a self,
        bot_id: BotId,
        normalized_symbol: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<Strategy>>> {
        self.inner.find_active_strategy(bot_id, normalized_symbol)
    }

    fn get_strategy(&self, id: StrategyId) -> BoxFuture<'_, StoreResult<Option<Strategy>>> {
        self.inner.get_strategy(id)
    }

    fn get_bot(&self, id: BotId) -> BoxFuture<'_, StoreResult<Option<Bot>>> {
        self.inner.get_bot(id)
    }

    fn active_bots(&self) -> BoxFuture<'_, StoreResult<Vec<Bot>>> {
        self.inner.active_bots()
    }
}
