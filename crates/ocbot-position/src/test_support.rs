//! Reconciler test fixture: one Binance paper bot with a BTCUSDT strategy.

use std::sync::Arc;
use std::time::Duration;

use ocbot_core::{
    Bot, BotId, EntryOrder, ExchangeKind, ManualClock, NewPosition, Position, PositionSide,
    PositionStatus, Strategy, StrategyId, TradeType,
};
use ocbot_exchange::{ExchangeClient, PaperExchange, SharedExchange};
use ocbot_orders::{ExitOrderPlacer, GlobalOrderCoordinator, OrdersConfig};
use ocbot_store::{MemoryStore, PositionStore};

use crate::config::ReconcilerConfig;
use crate::reconciler::PositionReconciler;
use crate::report::BotSyncReport;

pub(crate) const START_MS: u64 = 1_700_000_000_000;

pub(crate) struct Fixture {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub exchange: Arc<PaperExchange>,
    pub reconciler: Arc<PositionReconciler>,
}

fn bot(id: u64, exchange: ExchangeKind) -> Bot {
    Bot {
        id: BotId::new(id),
        name: format!("paper-{id}"),
        exchange,
        is_active: true,
        max_concurrent_positions: 5,
        risk_amount_usd: None,
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let exchange = Arc::new(PaperExchange::new(ExchangeKind::Binance, clock.clone()));
        Self::with_exchange(clock, exchange, config)
    }

    pub fn with_exchange(
        clock: Arc<ManualClock>,
        exchange: Arc<PaperExchange>,
        config: ReconcilerConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::new(clock.clone()));
        store.insert_bot(bot(1, ExchangeKind::Binance));
        store.insert_strategy(Strategy {
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
        });

        let orders = OrdersConfig::default();
        let coordinator = Arc::new(GlobalOrderCoordinator::new(orders.clone(), clock.clone()));
        let placer = Arc::new(ExitOrderPlacer::new(store.clone(), clock.clone(), &orders));
        let reconciler = Arc::new(PositionReconciler::new(
            store.clone(),
            clock.clone(),
            coordinator,
            placer,
            config,
        ));
        reconciler.register_exchange(BotId::new(1), exchange.clone());

        Self {
            clock,
            store,
            exchange,
            reconciler,
        }
    }

    pub fn shared_exchange(&self) -> SharedExchange {
        self.exchange.clone()
    }

    /// Register another active bot with its own exchange.
    pub fn add_bot(&self, id: u64, exchange: Arc<PaperExchange>) {
        self.store.insert_bot(bot(id, exchange.exchange()));
        self.reconciler.register_exchange(BotId::new(id), exchange);
    }

    /// One pass for bot 1.
    pub async fn sync(&self) -> BotSyncReport {
        self.reconciler
            .sync_bot_positions(BotId::new(1), &self.shared_exchange())
            .await
            .unwrap()
    }

    /// Let scheduled exit placements run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Open row plus matching exchange position; ticker at entry.
    pub async fn insert_open(&self, side: PositionSide, entry: f64, quantity: f64) -> Position {
        self.exchange.set_ticker("BTCUSDT", entry);
        self.exchange.set_position("BTCUSDT", side, quantity, entry);
        self.insert(side, entry, quantity, PositionStatus::Open).await
    }

    /// Long BTCUSDT row with `status`; the exchange book is left untouched.
    pub async fn insert_with_status(&self, status: PositionStatus) -> Position {
        self.insert(PositionSide::Long, 100.0, 1.0, status).await
    }

    /// `entry_pending` row waiting on `entry`; the exchange book is left untouched.
    pub async fn insert_for_entry(&self, entry: &EntryOrder) -> Position {
        self.store
            .insert_position(NewPosition {
                bot_id: entry.bot_id,
                strategy_id: Some(entry.strategy_id),
                exchange: ExchangeKind::Binance,
                symbol: entry.symbol.clone(),
                side: entry.side,
                entry_price: entry.entry_price,
                amount: entry.amount,
                quantity: entry.quantity,
                status: PositionStatus::EntryPending,
                entry_order_id: Some(entry.order_id.clone()),
                tp_price: None,
                stop_loss_price: None,
                current_reduce: None,
                reservation_token: entry.reservation_token.clone(),
                opened_at_ms: START_MS,
            })
            .await
            .unwrap()
    }

    async fn insert(
        &self,
        side: PositionSide,
        entry: f64,
        quantity: f64,
        status: PositionStatus,
    ) -> Position {
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
                status,
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

    /// Active rows of every bot.
    pub fn active(&self) -> Vec<Position> {
        self.store
            .all_positions()
            .into_iter()
            .filter(Position::is_active)
            .collect()
    }
}
