//! Take-profit / stop-loss placement for one position.
//!
//! One run of `tpsl:{position_id}`:
//!
//! 1. Read the row. An inactive row or a fresh lock held by another worker
//!    skips the run.
//! 2. Ask the exchange how much is closable. Nothing closable is a ghost
//!    position and fails without retry.
//! 3. Resolve targets: stored prices first, else derived from the strategy
//!    (and the bot's USD risk budget for the stop). When every target
//!    already rests on the exchange the run ends here without a write.
//! 4. Take the soft lock with a versioned write; a stale lock is reclaimed.
//! 5. If the ticker already crossed the take-profit, close at market and
//!    move the row to `tp_pending`. Otherwise place each leg whose resting
//!    order is missing or priced differently, then cancel the order it
//!    replaces.
//! 6. Persist order ids and prices and clear the lock with a versioned
//!    write, re-reading on conflict a bounded number of times. Orders placed
//!    for a row that closed meanwhile are cancelled.

use std::sync::Arc;

use ocbot_core::{ExchangeOrder, Position, PositionId, PositionSide, PositionStatus, SharedClock};
use ocbot_exchange::{
    ExchangeClient, ExchangeError, ExchangeErrorKind, Operation, OrderRequest, SharedExchange,
};
use ocbot_pricing::ExitTargets;
use ocbot_queue::TaskSpec;
use ocbot_store::{SharedStore, UpdateOutcome};
use ocbot_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::config::OrdersConfig;
use crate::coordinator::GlobalOrderCoordinator;
use crate::error::{OrderError, OrderResult};
use crate::outcome::{OrderOutcome, SkipReason};
use crate::scheduler::{OrderHandle, OrderTask};

/// Relative tolerance when comparing a resting trigger price to a target.
const PRICE_EPSILON: f64 = 1e-9;

/// Dedup key for a position's exit-order work.
pub fn exit_task_key(position_id: PositionId) -> String {
    format!("tpsl:{position_id}")
}

fn same_price(a: f64, b: f64) -> bool {
    (a - b).abs() <= PRICE_EPSILON * a.abs().max(b.abs()).max(1.0)
}

fn tp_crossed(side: PositionSide, ticker: f64, tp: f64) -> bool {
    match side {
        PositionSide::Long => ticker >= tp,
        PositionSide::Short => ticker <= tp,
    }
}

fn exchange_err(operation: Operation) -> impl Fn(ExchangeError) -> OrderError {
    move |err| {
        Metrics::exchange_error(operation.as_str(), err.kind.as_str());
        OrderError::Exchange(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    TakeProfit,
    StopLoss,
}

impl Leg {
    fn label(&self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
        }
    }
}

/// Field changes produced by one run, applied onto whatever row version
/// is current at commit time.
#[derive(Debug, Clone, Default, PartialEq)]
struct ExitPatch {
    status: Option<PositionStatus>,
    tp_price: Option<f64>,
    stop_loss_price: Option<f64>,
    tp_order_id: Option<String>,
    sl_order_id: Option<String>,
}

impl ExitPatch {
    fn apply(&self, position: &mut Position) {
        if let Some(status) = self.status {
            position.status = status;
        }
        if let Some(tp) = self.tp_price {
            position.tp_price = Some(tp);
            position.initial_tp_price.get_or_insert(tp);
        }
        if let Some(sl) = self.stop_loss_price {
            position.stop_loss_price = Some(sl);
        }
        if let Some(id) = &self.sl_order_id {
            position.sl_order_id = Some(id.clone());
        }
        if let Some(id) = &self.tp_order_id {
            position.tp_order_id = Some(id.clone());
        }
        // The TP order is the exit reference; the SL stands in only without one.
        if self.tp_order_id.is_some() || self.sl_order_id.is_some() {
            position.exit_order_id = position
                .tp_order_id
                .clone()
                .or_else(|| position.sl_order_id.clone());
        }
        position.release_lock();
    }

    fn placed_order_ids(&self) -> impl Iterator<Item = &String> {
        [&self.tp_order_id, &self.sl_order_id].into_iter().flatten()
    }
}

/// Exchange-side inputs of one run.
#[derive(Debug, Clone)]
struct Plan {
    quantity: f64,
    tp: Option<f64>,
    sl: Option<f64>,
    ticker: f64,
    /// Resting orders the row references; not read when the TP is crossed.
    tp_resting: Option<ExchangeOrder>,
    sl_resting: Option<ExchangeOrder>,
}

impl Plan {
    fn crossed_tp(&self, side: PositionSide) -> Option<f64> {
        self.tp.filter(|&tp| tp_crossed(side, self.ticker, tp))
    }

    /// Every target already rests on the exchange and is stored on the row.
    fn is_noop(&self, position: &Position) -> bool {
        let rests = |target: Option<f64>, order: &Option<ExchangeOrder>| match target {
            Some(price) => order
                .as_ref()
                .and_then(|o| o.stop_price)
                .is_some_and(|stop| same_price(stop, price)),
            None => true,
        };
        self.crossed_tp(position.side).is_none()
            && rests(self.tp, &self.tp_resting)
            && rests(self.sl, &self.sl_resting)
            && position.tp_price == self.tp
            && position.stop_loss_price == self.sl
    }
}

enum LockOutcome {
    Acquired(Position),
    Skip(SkipReason),
}

/// Places and replaces a position's exit orders.
pub struct ExitOrderPlacer {
    store: SharedStore,
    clock: SharedClock,
    stale_lock_ms: u64,
    max_version_retries: u32,
}

impl ExitOrderPlacer {
    pub fn new(store: SharedStore, clock: SharedClock, config: &OrdersConfig) -> Self {
        Self {
            store,
            clock,
            stale_lock_ms: config.stale_lock_ms,
            max_version_retries: config.max_version_retries,
        }
    }

    /// Keyed task for `position`, prioritized by its age.
    pub fn task(self: &Arc<Self>, position: &Position, exchange: SharedExchange) -> OrderTask {
        let placer = self.clone();
        let id = position.id;
        let age = position.age_ms(self.clock.now_ms());
        TaskSpec::new(move || {
            let placer = placer.clone();
            let exchange = exchange.clone();
            async move { placer.place(id, exchange.as_ref()).await }
        })
        .with_key(exit_task_key(id))
        .with_priority(i64::try_from(age).unwrap_or(i64::MAX))
    }

    /// Push `position`'s exit work through the coordinator.
    pub fn schedule(
        self: &Arc<Self>,
        coordinator: &GlobalOrderCoordinator,
        position: &Position,
        exchange: SharedExchange,
    ) -> OrderHandle {
        debug!(
            position_id = %position.id,
            bot_id = %position.bot_id,
            key = %exit_task_key(position.id),
            "Scheduling exit orders"
        );
        coordinator.push_task(position.bot_id, self.task(position, exchange))
    }

    /// Run the placement once.
    ///
    /// A run that would change nothing returns before the lock is taken,
    /// so it leaves the row untouched.
    pub async fn place(
        &self,
        position_id: PositionId,
        exchange: &dyn ExchangeClient,
    ) -> OrderResult<OrderOutcome> {
        let position = self.read(position_id).await?;
        if let Some(reason) = self.skip_reason(&position) {
            debug!(position_id = %position_id, %reason, "Exit placement skipped");
            return Ok(OrderOutcome::Skipped(reason));
        }
        match self.assess(&position, exchange).await? {
            None => {
                debug!(position_id = %position_id, "No exit targets");
                return Ok(OrderOutcome::Skipped(SkipReason::NoTargets));
            }
            Some(plan) if plan.is_noop(&position) => {
                debug!(position_id = %position_id, "Exit orders already in place");
                return Ok(OrderOutcome::Unchanged);
            }
            Some(_) => {}
        }

        let position = match self.lock(position_id).await? {
            LockOutcome::Acquired(position) => position,
            LockOutcome::Skip(reason) => {
                debug!(position_id = %position_id, %reason, "Exit placement skipped");
                return Ok(OrderOutcome::Skipped(reason));
            }
        };

        match self.work(&position, exchange).await {
            Ok((outcome, patch)) => {
                self.commit(position, &patch, exchange).await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(release_err) =
                    self.commit(position, &ExitPatch::default(), exchange).await
                {
                    warn!(
                        position_id = %position_id,
                        error = %release_err,
                        "Failed to release soft lock after error"
                    );
                }
                Err(err)
            }
        }
    }

    async fn read(&self, id: PositionId) -> OrderResult<Position> {
        self.store
            .get_position(id)
            .await?
            .ok_or(OrderError::PositionNotFound(id))
    }

    fn skip_reason(&self, position: &Position) -> Option<SkipReason> {
        if position.status != PositionStatus::Open {
            Some(SkipReason::Inactive)
        } else if position.is_locked(self.clock.now_ms(), self.stale_lock_ms) {
            Some(SkipReason::Locked)
        } else {
            None
        }
    }

    async fn lock(&self, id: PositionId) -> OrderResult<LockOutcome> {
        for _ in 0..=self.max_version_retries {
            let position = self.read(id).await?;
            if let Some(reason) = self.skip_reason(&position) {
                return Ok(LockOutcome::Skip(reason));
            }
            if position.is_processing {
                warn!(
                    position_id = %id,
                    since_ms = ?position.processing_since_ms,
                    "Reclaiming stale soft lock"
                );
            }

            let mut locked = position;
            locked.acquire_lock(self.clock.now_ms());
            match self.store.update_position(locked.clone()).await? {
                UpdateOutcome::Applied { new_version } => {
                    locked.row_version = new_version;
                    return Ok(LockOutcome::Acquired(locked));
                }
                UpdateOutcome::Conflict { current_version } => {
                    debug!(position_id = %id, current_version, "Lock write lost, re-reading");
                }
            }
        }
        Err(OrderError::StaleVersion(id))
    }

    async fn commit(
        &self,
        locked: Position,
        patch: &ExitPatch,
        exchange: &dyn ExchangeClient,
    ) -> OrderResult<()> {
        let id = locked.id;
        let mut current = locked;
        for _ in 0..=self.max_version_retries {
            let mut next = current.clone();
            patch.apply(&mut next);
            match self.store.update_position(next).await? {
                UpdateOutcome::Applied { .. } => return Ok(()),
                UpdateOutcome::Conflict { current_version } => {
                    debug!(position_id = %id, current_version, "Commit lost, re-reading");
                    current = self.read(id).await?;
                    if !current.is_active() {
                        warn!(position_id = %id, status = %current.status, "Row closed mid-placement");
                        self.cancel_unrecorded(&current, patch, exchange).await;
                        return Err(OrderError::StaleVersion(id));
                    }
                }
            }
        }
        Err(OrderError::StaleVersion(id))
    }

    /// Cancel orders this run placed for a row that closed before they
    /// could be recorded.
    async fn cancel_unrecorded(
        &self,
        position: &Position,
        patch: &ExitPatch,
        exchange: &dyn ExchangeClient,
    ) {
        for order_id in patch.placed_order_ids() {
            match exchange.cancel_order(order_id, &position.symbol).await {
                Ok(()) => {
                    Metrics::order_cancelled("position_closed");
                    info!(
                        position_id = %position.id,
                        order_id = %order_id,
                        "Cancelled exit order of a closed position"
                    );
                }
                Err(err) if err.kind == ExchangeErrorKind::OrderNotFound => {}
                Err(err) => {
                    Metrics::exchange_error(Operation::CancelOrder.as_str(), err.kind.as_str());
                    warn!(
                        position_id = %position.id,
                        order_id = %order_id,
                        error = %err,
                        "Failed to cancel exit order of a closed position"
                    );
                }
            }
        }
    }

    async fn targets(
        &self,
        position: &Position,
        quantity: f64,
    ) -> OrderResult<(Option<f64>, Option<f64>)> {
        let strategy = match position.strategy_id {
            Some(id) => self.store.get_strategy(id).await?,
            None => None,
        };
        let bot = self.store.get_bot(position.bot_id).await?;
        let derived = strategy
            .as_ref()
            .map(|s| {
                ExitTargets::derive(s, bot.as_ref(), position.entry_price, quantity, position.side)
            })
            .unwrap_or_default();
        Ok((
            position.tp_price.or(derived.take_profit),
            position.stop_loss_price.or(derived.stop_loss),
        ))
    }

    /// Read closable quantity, targets, ticker and resting orders. `None`
    /// when there is no target to protect.
    async fn assess(
        &self,
        position: &Position,
        exchange: &dyn ExchangeClient,
    ) -> OrderResult<Option<Plan>> {
        let quantity = exchange
            .get_closable_quantity(&position.symbol, position.side)
            .await
            .map_err(exchange_err(Operation::GetClosableQuantity))?;
        if quantity <= 0.0 {
            warn!(
                position_id = %position.id,
                symbol = %position.symbol,
                side = %position.side,
                "Nothing closable on exchange"
            );
            return Err(OrderError::GhostPosition(position.id));
        }

        let (tp, sl) = self.targets(position, quantity).await?;
        if tp.is_none() && sl.is_none() {
            return Ok(None);
        }

        let ticker = exchange
            .get_ticker_price(&position.symbol)
            .await
            .map_err(exchange_err(Operation::GetTickerPrice))?;
        let mut plan = Plan {
            quantity,
            tp,
            sl,
            ticker,
            tp_resting: None,
            sl_resting: None,
        };
        if plan.crossed_tp(position.side).is_none() {
            let open_orders = exchange
                .get_open_orders(Some(&position.symbol))
                .await
                .map_err(exchange_err(Operation::GetOpenOrders))?;
            let resting = |id: &Option<String>| -> Option<ExchangeOrder> {
                let id = id.as_deref()?;
                open_orders.iter().find(|o| o.order_id == id).cloned()
            };
            plan.tp_resting = resting(&position.tp_order_id);
            plan.sl_resting = resting(&position.sl_order_id);
        }
        Ok(Some(plan))
    }

    async fn work(
        &self,
        position: &Position,
        exchange: &dyn ExchangeClient,
    ) -> OrderResult<(OrderOutcome, ExitPatch)> {
        let Some(plan) = self.assess(position, exchange).await? else {
            return Ok((OrderOutcome::Skipped(SkipReason::NoTargets), ExitPatch::default()));
        };

        if let Some(tp) = plan.crossed_tp(position.side) {
            let placed = exchange
                .close_position(&position.symbol, position.side, plan.quantity)
                .await
                .map_err(exchange_err(Operation::ClosePosition))?;
            Metrics::order_placed("market_close");
            info!(
                position_id = %position.id,
                bot_id = %position.bot_id,
                symbol = %position.symbol,
                side = %position.side,
                ticker = plan.ticker,
                tp,
                order_id = %placed.order_id,
                "Take-profit already crossed, closed at market"
            );
            let patch = ExitPatch {
                status: Some(PositionStatus::TpPending),
                tp_price: Some(tp),
                ..ExitPatch::default()
            };
            return Ok((
                OrderOutcome::ClosedAtMarket {
                    order_id: placed.order_id,
                },
                patch,
            ));
        }

        let Plan {
            quantity,
            tp,
            sl,
            tp_resting,
            sl_resting,
            ..
        } = plan;
        let mut patch = ExitPatch {
            tp_price: tp,
            stop_loss_price: sl,
            ..ExitPatch::default()
        };
        if let Some(price) = tp {
            patch.tp_order_id = self
                .replace_leg(exchange, position, quantity, Leg::TakeProfit, price, tp_resting)
                .await?;
        }
        if let Some(price) = sl {
            patch.sl_order_id = self
                .replace_leg(exchange, position, quantity, Leg::StopLoss, price, sl_resting)
                .await?;
        }

        let outcome = if patch.tp_order_id.is_none() && patch.sl_order_id.is_none() {
            OrderOutcome::Unchanged
        } else {
            OrderOutcome::Placed {
                tp_order_id: patch.tp_order_id.clone(),
                sl_order_id: patch.sl_order_id.clone(),
            }
        };
        Ok((outcome, patch))
    }

    /// Place one leg unless an identical order already rests. Returns the
    /// new order id, or `None` when the existing order was kept.
    async fn replace_leg(
        &self,
        exchange: &dyn ExchangeClient,
        position: &Position,
        quantity: f64,
        leg: Leg,
        price: f64,
        existing: Option<ExchangeOrder>,
    ) -> OrderResult<Option<String>> {
        if let Some(order) = &existing {
            if order.stop_price.is_some_and(|stop| same_price(stop, price)) {
                return Ok(None);
            }
        }

        let request = match leg {
            Leg::TakeProfit => {
                OrderRequest::take_profit(&position.symbol, position.side, quantity, price)
            }
            Leg::StopLoss => {
                OrderRequest::stop_loss(&position.symbol, position.side, quantity, price)
            }
        };
        let placed = exchange
            .place_order(request)
            .await
            .map_err(exchange_err(Operation::PlaceOrder))?;
        Metrics::order_placed(leg.label());
        info!(
            position_id = %position.id,
            bot_id = %position.bot_id,
            symbol = %position.symbol,
            side = %position.side,
            leg = leg.label(),
            price,
            order_id = %placed.order_id,
            "Exit order placed"
        );

        if let Some(old) = existing {
            match exchange.cancel_order(&old.order_id, &position.symbol).await {
                Ok(()) => Metrics::order_cancelled("replaced"),
                Err(err) if err.kind == ExchangeErrorKind::OrderNotFound => {}
                Err(err) => {
                    Metrics::exchange_error(Operation::CancelOrder.as_str(), err.kind.as_str());
                    warn!(
                        position_id = %position.id,
                        order_id = %old.order_id,
                        error = %err,
                        "Failed to cancel replaced exit order"
                    );
                }
            }
        }
        Ok(Some(placed.order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{strategy, Fixture, RacingStore};
    use ocbot_store::PositionStore;
    use ocbot_core::Clock;

    fn racing_placer(fx: &Fixture) -> (Arc<RacingStore>, ExitOrderPlacer) {
        let racing = RacingStore::new(fx.store.clone());
        let placer =
            ExitOrderPlacer::new(racing.clone(), fx.clock.clone(), &OrdersConfig::default());
        (racing, placer)
    }

    #[tokio::test]
    async fn test_places_both_legs_for_fresh_position() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;

        let outcome = fx.placer().place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert!(matches!(
            outcome,
            OrderOutcome::Placed {
                tp_order_id: Some(_),
                sl_order_id: Some(_)
            }
        ));

        let row = fx.reload(&pos).await;
        assert!((row.tp_price.unwrap() - 101.0).abs() < 1e-9);
        assert_eq!(row.initial_tp_price, row.tp_price);
        assert!((row.stop_loss_price.unwrap() - 95.0).abs() < 1e-9);
        assert!(row.has_take_profit_order() && row.has_stop_loss_order());
        assert_eq!(row.exit_order_id, row.tp_order_id);
        assert!(!row.is_processing);
        assert_eq!(row.row_version, 3);
        assert_eq!(fx.exchange.open_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_keeps_matching_orders() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Short, 100.0, 2.0).await;
        let placer = fx.placer();

        placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();

        assert_eq!(outcome, OrderOutcome::Unchanged);
        assert_eq!(fx.exchange.call_count(Operation::PlaceOrder), 2);
        assert_eq!(fx.exchange.open_orders().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_run_does_not_write() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let placer = fx.placer();
        placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        let writes = fx.store.write_count();
        let version = fx.reload(&pos).await.row_version;

        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert_eq!(outcome, OrderOutcome::Unchanged);
        assert_eq!(fx.store.write_count(), writes);
        assert_eq!(fx.reload(&pos).await.row_version, version);
    }

    #[tokio::test]
    async fn test_stop_only_position_settles_without_writes() {
        let fx = Fixture::new();
        fx.store.insert_strategy(ocbot_core::Strategy {
            take_profit: 0.0,
            ..strategy()
        });
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let placer = fx.placer();

        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert!(matches!(
            outcome,
            OrderOutcome::Placed {
                tp_order_id: None,
                sl_order_id: Some(_)
            }
        ));
        let row = fx.reload(&pos).await;
        assert_eq!(row.tp_price, None);
        assert_eq!(row.exit_order_id, row.sl_order_id);

        let writes = fx.store.write_count();
        for _ in 0..3 {
            let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
            assert_eq!(outcome, OrderOutcome::Unchanged);
        }
        assert_eq!(fx.store.write_count(), writes);
        assert_eq!(fx.exchange.open_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_no_targets_skips_without_writes() {
        let fx = Fixture::new();
        fx.store.insert_strategy(ocbot_core::Strategy {
            take_profit: 0.0,
            stoploss: 0.0,
            ..strategy()
        });
        let pos = fx.open_position(PositionSide::Short, 100.0, 1.0).await;
        let writes = fx.store.write_count();

        let outcome = fx.placer().place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert_eq!(outcome, OrderOutcome::Skipped(SkipReason::NoTargets));
        assert_eq!(fx.store.write_count(), writes);
        assert!(fx.exchange.open_orders().is_empty());
    }

    #[tokio::test]
    async fn test_lost_lock_write_is_retried_on_fresh_row() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let (racing, placer) = racing_placer(&fx);
        racing.race(|p| p.not_on_exchange_count = 1);

        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Placed { .. }));

        let row = fx.reload(&pos).await;
        assert_eq!(row.not_on_exchange_count, 1);
        assert!(row.has_take_profit_order() && row.has_stop_loss_order());
        assert!(!row.is_processing);
        // insert, competing write, lock, commit
        assert_eq!(row.row_version, 4);
    }

    #[tokio::test]
    async fn test_lost_commit_reapplies_patch_on_fresh_row() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Short, 100.0, 1.0).await;
        let (racing, placer) = racing_placer(&fx);
        racing.pass();
        racing.race(|p| p.not_on_exchange_count = 2);

        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        let OrderOutcome::Placed {
            tp_order_id: Some(tp),
            sl_order_id: Some(sl),
        } = outcome
        else {
            panic!("unexpected outcome {outcome:?}");
        };

        let row = fx.reload(&pos).await;
        assert_eq!(row.not_on_exchange_count, 2);
        assert_eq!(row.tp_order_id.as_deref(), Some(tp.as_str()));
        assert_eq!(row.sl_order_id.as_deref(), Some(sl.as_str()));
        assert_eq!(row.exit_order_id, row.tp_order_id);
        assert!(!row.is_processing);
    }

    #[tokio::test]
    async fn test_commit_abandons_after_version_retries() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let (racing, placer) = racing_placer(&fx);
        racing.pass();
        for _ in 0..=OrdersConfig::default().max_version_retries {
            racing.race(|p| p.not_on_exchange_count += 1);
        }

        let err = placer
            .place(pos.id, fx.exchange.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err, OrderError::StaleVersion(pos.id));
        assert!(!ocbot_core::Retryable::is_retryable(&err));
        assert!(!fx.reload(&pos).await.has_take_profit_order());
    }

    #[tokio::test]
    async fn test_orders_cancelled_when_row_closes_mid_placement() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let (racing, placer) = racing_placer(&fx);
        racing.pass();
        racing.race(|p| p.status = PositionStatus::Closed);

        let err = placer
            .place(pos.id, fx.exchange.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err, OrderError::StaleVersion(pos.id));
        assert_eq!(fx.exchange.call_count(Operation::PlaceOrder), 2);
        assert!(fx.exchange.open_orders().is_empty());
        assert_eq!(fx.reload(&pos).await.status, PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_moved_take_profit_replaces_only_that_leg() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let placer = fx.placer();
        placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();

        let mut row = fx.reload(&pos).await;
        let old_tp = row.tp_order_id.clone().unwrap();
        row.tp_price = Some(100.5);
        fx.store.update_position(row).await.unwrap();

        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        let OrderOutcome::Placed {
            tp_order_id: Some(new_tp),
            sl_order_id: None,
        } = outcome
        else {
            panic!("unexpected outcome {outcome:?}");
        };

        let orders = fx.exchange.open_orders();
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().all(|o| o.order_id != old_tp));
        let tp_order = orders.iter().find(|o| o.order_id == new_tp).unwrap();
        assert_eq!(tp_order.stop_price, Some(100.5));
    }

    #[tokio::test]
    async fn test_crossed_take_profit_closes_at_market() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        fx.exchange.set_ticker("BTCUSDT", 102.0);

        let outcome = fx.placer().place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::ClosedAtMarket { .. }));

        let row = fx.reload(&pos).await;
        assert_eq!(row.status, PositionStatus::TpPending);
        assert!(!row.is_processing);
        assert!(fx
            .exchange
            .position("BTCUSDT", PositionSide::Long)
            .unwrap()
            .is_flat());
    }

    #[tokio::test]
    async fn test_ghost_position_fails_and_releases_lock() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        fx.exchange.flatten("BTCUSDT", PositionSide::Long);

        let err = fx
            .placer()
            .place(pos.id, fx.exchange.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err, OrderError::GhostPosition(pos.id));
        assert!(!fx.reload(&pos).await.is_processing);
        assert_eq!(fx.exchange.call_count(Operation::PlaceOrder), 0);
    }

    #[tokio::test]
    async fn test_fresh_lock_skips_and_stale_lock_is_reclaimed() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        let mut row = fx.reload(&pos).await;
        row.acquire_lock(fx.clock.now_ms());
        fx.store.update_position(row).await.unwrap();

        let placer = fx.placer();
        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert_eq!(outcome, OrderOutcome::Skipped(SkipReason::Locked));
        assert!(fx.exchange.calls().is_empty());

        fx.clock.advance_ms(OrdersConfig::default().stale_lock_ms + 1);
        let outcome = placer.place(pos.id, fx.exchange.as_ref()).await.unwrap();
        assert!(matches!(outcome, OrderOutcome::Placed { .. }));
    }

    #[tokio::test]
    async fn test_transient_exchange_error_is_retryable() {
        let fx = Fixture::new();
        let pos = fx.open_position(PositionSide::Long, 100.0, 1.0).await;
        fx.exchange
            .fail_next(Operation::GetTickerPrice, ExchangeError::network("timeout"));

        let err = fx
            .placer()
            .place(pos.id, fx.exchange.as_ref())
            .await
            .unwrap_err();
        assert!(ocbot_core::Retryable::is_retryable(&err));
        assert!(!fx.reload(&pos).await.is_processing);
    }

    #[test]
    fn test_patch_prefers_tp_as_exit_reference() {
        let patch = |tp: Option<&str>, sl: Option<&str>| ExitPatch {
            tp_order_id: tp.map(str::to_string),
            sl_order_id: sl.map(str::to_string),
            ..ExitPatch::default()
        };
        let mut pos = Position::from_new(
            PositionId::new(1),
            ocbot_core::NewPosition {
                bot_id: ocbot_core::BotId::new(1),
                strategy_id: None,
                exchange: ocbot_core::ExchangeKind::Binance,
                symbol: "BTCUSDT".into(),
                side: PositionSide::Long,
                entry_price: 1.0,
                amount: 1.0,
                quantity: 1.0,
                status: PositionStatus::Open,
                entry_order_id: None,
                tp_price: None,
                stop_loss_price: None,
                current_reduce: None,
                reservation_token: None,
                opened_at_ms: 0,
            },
        );
        patch(None, Some("9")).apply(&mut pos);
        assert_eq!(pos.exit_order_id.as_deref(), Some("9"));
        patch(Some("10"), Some("11")).apply(&mut pos);
        assert_eq!(pos.exit_order_id.as_deref(), Some("10"));
        patch(None, Some("12")).apply(&mut pos);
        assert_eq!(pos.sl_order_id.as_deref(), Some("12"));
        assert_eq!(pos.exit_order_id.as_deref(), Some("10"));
    }
}
