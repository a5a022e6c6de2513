//! Position reconciler.
//!
//! Each pass diffs one bot's local ledger against its exchange account and
//! repairs divergence in place:
//! - exchange position with no local row: materialize it
//! - `entry_pending` row whose position is filled: promote to `open` and
//!   settle its entry order and reservation
//! - row whose exchange slot reports zero size: close (`sync_exchange_closed`)
//! - row absent from the snapshot: count, force close at the threshold
//! - open row lacking a TP or SL order: enqueue placement
//! - duplicate exit orders: cancel
//!
//! Writes are version-conditioned and every step is idempotent; a lost race
//! is left for the next pass.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ocbot_core::{
    BotId, CloseReason, EntryOrder, EntryOrderStatus, ExchangePosition, NewPosition, Position,
    PositionSide, PositionStatus, ReservationStatus, SharedClock,
};
use ocbot_exchange::{ExchangeErrorKind, ExchangeResult, Operation, SharedExchange};
use ocbot_orders::{ExitOrderPlacer, GlobalOrderCoordinator};
use ocbot_pricing::{pnl_percent, realized_pnl, ExitTargets};
use ocbot_store::{SharedStore, StoreError, UpdateOutcome};
use ocbot_telemetry::{LogThrottle, Metrics};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::dedup::redundant_exit_orders;
use crate::error::{PositionError, PositionResult};
use crate::report::{BotSyncReport, SyncOutcome, SyncSummary};

type SlotKey = (String, PositionSide);

/// Clears the process-wide pass flag even if the pass unwinds.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// PositionReconciler
// ============================================================================

pub struct PositionReconciler {
    store: SharedStore,
    clock: SharedClock,
    coordinator: Arc<GlobalOrderCoordinator>,
    placer: Arc<ExitOrderPlacer>,
    exchanges: DashMap<BotId, SharedExchange>,
    config: RwLock<ReconcilerConfig>,
    throttle: RwLock<LogThrottle>,
    running: AtomicBool,
}

impl PositionReconciler {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        coordinator: Arc<GlobalOrderCoordinator>,
        placer: Arc<ExitOrderPlacer>,
        config: ReconcilerConfig,
    ) -> Self {
        let throttle = LogThrottle::new(config.log_throttle_window_ms, clock.clone());
        Self {
            store,
            clock,
            coordinator,
            placer,
            exchanges: DashMap::new(),
            config: RwLock::new(config),
            throttle: RwLock::new(throttle),
            running: AtomicBool::new(false),
        }
    }

    /// Make `bot_id` part of full passes.
    pub fn register_exchange(&self, bot_id: BotId, exchange: SharedExchange) {
        self.exchanges.insert(bot_id, exchange);
        debug!(bot_id = %bot_id, "Exchange client registered for reconciliation");
    }

    pub fn exchange(&self, bot_id: BotId) -> Option<SharedExchange> {
        self.exchanges.get(&bot_id).map(|entry| entry.value().clone())
    }

    pub fn config(&self) -> ReconcilerConfig {
        self.config.read().clone()
    }

    /// Swap settings; the next pass picks them up.
    pub fn update_config(&self, config: ReconcilerConfig) {
        let mut current = self.config.write();
        if current.log_throttle_window_ms != config.log_throttle_window_ms {
            *self.throttle.write() =
                LogThrottle::new(config.log_throttle_window_ms, self.clock.clone());
        }
        info!(
            sync_interval_secs = config.sync_interval_secs,
            threshold = ?config.not_on_exchange_close_threshold,
            "Reconciler config updated"
        );
        *current = config;
    }

    /// Check if a full pass is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------------

    /// Reconcile every active bot with a registered exchange client.
    ///
    /// Only one full pass runs at a time; a concurrent call returns
    /// [`SyncOutcome::AlreadyRunning`]. A failing bot never stops the others.
    pub async fn sync_positions(&self) -> PositionResult<SyncOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconcile pass already running, skipping");
            Metrics::reconcile_cycle("skipped");
            return Ok(SyncOutcome::AlreadyRunning);
        }
        let _guard = PassGuard(&self.running);
        let started = tokio::time::Instant::now();

        let bots = self.store.active_bots().await?;
        let mut summary = SyncSummary::default();
        for bot in bots {
            let Some(exchange) = self.exchange(bot.id) else {
                self.throttled_warn(&format!("no_exchange:{}", bot.id), |suppressed| {
                    warn!(
                        bot_id = %bot.id,
                        suppressed,
                        "Active bot has no exchange client, skipping"
                    );
                });
                summary.failed_bots.push(bot.id);
                continue;
            };
            match self.sync_bot_positions(bot.id, &exchange).await {
                Ok(report) => {
                    summary.totals.merge(&report);
                    summary.synced_bots.push(bot.id);
                }
                Err(PositionError::Fetch { .. }) => summary.failed_bots.push(bot.id),
                Err(err) => {
                    Metrics::reconcile_cycle("failed");
                    warn!(bot_id = %bot.id, error = %err, "Bot reconciliation failed");
                    summary.failed_bots.push(bot.id);
                }
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        Metrics::reconcile_duration(elapsed_ms);
        info!(
            synced = summary.synced_bots.len(),
            failed = summary.failed_bots.len(),
            writes = summary.totals.writes(),
            exit_cancelled = summary.totals.exit_cancelled,
            elapsed_ms,
            "Reconcile pass complete"
        );
        Ok(SyncOutcome::Completed(summary))
    }

    /// Reconcile one bot.
    ///
    /// Not guarded against concurrent calls for the same bot; the store's
    /// uniqueness check and versioned writes keep overlapping passes safe.
    pub async fn sync_bot_positions(
        &self,
        bot_id: BotId,
        exchange: &SharedExchange,
    ) -> PositionResult<BotSyncReport> {
        let config = self.config();
        let fetch_key = format!("fetch_failed:{bot_id}");

        let remote = match self.fetch_positions(bot_id, exchange, &config).await {
            Ok(remote) => {
                self.throttle.read().reset(&fetch_key);
                remote
            }
            Err(err) => {
                Metrics::exchange_error(Operation::GetOpenPositions.as_str(), err.kind.as_str());
                Metrics::reconcile_cycle("fetch_failed");
                self.throttled_warn(&fetch_key, |suppressed| {
                    warn!(
                        bot_id = %bot_id,
                        error = %err,
                        suppressed,
                        "Exchange position fetch failed, skipping bot this cycle"
                    );
                });
                return Err(PositionError::Fetch {
                    bot_id,
                    source: err,
                });
            }
        };
        let local = self.store.active_positions(bot_id).await?;

        let mut report = BotSyncReport {
            exchange_positions: remote.iter().filter(|p| !p.is_flat()).count(),
            local_positions: local.len(),
            ..BotSyncReport::default()
        };
        let by_slot: HashMap<SlotKey, &Position> = local
            .iter()
            .map(|p| ((p.normalized_symbol.clone(), p.side), p))
            .collect();
        let mut reported: HashSet<SlotKey> = HashSet::new();

        for position in &remote {
            let slot = (position.normalized_symbol.clone(), position.side);
            let result = match by_slot.get(&slot) {
                Some(row) => {
                    self.reconcile_row(row, position, exchange, &config, &mut report)
                        .await
                }
                None if position.is_flat() => Ok(()),
                None => self.materialize(bot_id, position, exchange, &mut report).await,
            };
            reported.insert(slot);
            if let Err(err) = result {
                report.failed_actions += 1;
                warn!(
                    bot_id = %bot_id,
                    symbol = %position.symbol,
                    side = %position.side,
                    error = %err,
                    "Reconcile action failed"
                );
            }
        }

        for row in &local {
            if reported.contains(&(row.normalized_symbol.clone(), row.side)) {
                continue;
            }
            if let Err(err) = self.handle_missing(row, exchange, &config, &mut report).await {
                report.failed_actions += 1;
                warn!(position_id = %row.id, error = %err, "Missing-row handling failed");
            }
        }

        self.dedup_exit_orders(bot_id, exchange, &local, &mut report)
            .await;

        Metrics::reconcile_cycle("ok");
        debug!(bot_id = %bot_id, report = ?report, "Bot reconciled");
        Ok(report)
    }

    /// Run timer-driven passes until `cancel` fires. The interval is re-read
    /// after every pass.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.read().sync_interval_secs,
            bots = self.exchanges.len(),
            "Position reconciler started"
        );
        loop {
            let interval = Duration::from_secs(self.config.read().sync_interval_secs.max(1));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.sync_positions().await {
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Reconcile pass failed"),
            }
        }
        info!("Position reconciler stopped");
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    async fn fetch_positions(
        &self,
        bot_id: BotId,
        exchange: &SharedExchange,
        config: &ReconcilerConfig,
    ) -> ExchangeResult<Vec<ExchangePosition>> {
        if config.cached_snapshots {
            self.coordinator
                .get_cached_exchange_positions(bot_id, exchange.as_ref(), None)
                .await
        } else {
            exchange.get_open_positions(None).await
        }
    }

    /// A local row matched an exchange slot.
    async fn reconcile_row(
        &self,
        row: &Position,
        remote: &ExchangePosition,
        exchange: &SharedExchange,
        config: &ReconcilerConfig,
        report: &mut BotSyncReport,
    ) -> PositionResult<()> {
        let now = self.clock.now_ms();
        if row.is_locked(now, config.stale_lock_ms) {
            report.skipped_locked += 1;
            debug!(position_id = %row.id, "Row is being processed, leaving it for the next pass");
            return Ok(());
        }

        if remote.is_flat() {
            if row.status.expects_exchange_position() {
                let closed = self
                    .close(row, CloseReason::SyncExchangeClosed, remote.mark_price, report)
                    .await?;
                if closed {
                    report.closed_zero_size += 1;
                    Metrics::reconcile_action("closed_zero_size");
                }
            }
            return Ok(());
        }

        match row.status {
            PositionStatus::EntryPending => {
                let mut updated = row.clone();
                updated.status = PositionStatus::Open;
                updated.not_on_exchange_count = 0;
                if let Some(promoted) = self.write(updated, report).await? {
                    report.promoted += 1;
                    Metrics::reconcile_action("promoted");
                    info!(
                        position_id = %row.id,
                        bot_id = %row.bot_id,
                        symbol = %row.symbol,
                        side = %row.side,
                        "Entry filled, position promoted to open"
                    );
                    if let Err(err) = self.settle_entry(&promoted).await {
                        report.failed_actions += 1;
                        warn!(
                            position_id = %row.id,
                            error = %err,
                            "Failed to settle entry order of promoted position"
                        );
                    }
                    let _ = self.placer.schedule(&self.coordinator, &promoted, exchange.clone());
                }
            }
            PositionStatus::Open | PositionStatus::TpPending => {
                let mut current = row.clone();
                if row.not_on_exchange_count != 0 {
                    current.not_on_exchange_count = 0;
                    match self.write(current, report).await? {
                        Some(written) => {
                            report.counters_reset += 1;
                            current = written;
                        }
                        None => return Ok(()),
                    }
                }
                if self.needs_exit_repair(&current).await? {
                    report.exit_repairs += 1;
                    Metrics::reconcile_action("exit_repair");
                    debug!(position_id = %row.id, "Exit orders missing, enqueueing placement");
                    let _ = self.placer.schedule(&self.coordinator, &current, exchange.clone());
                }
            }
            PositionStatus::Closed | PositionStatus::Cancelled => {}
        }
        Ok(())
    }

    /// A local row whose slot the exchange did not report at all.
    async fn handle_missing(
        &self,
        row: &Position,
        exchange: &SharedExchange,
        config: &ReconcilerConfig,
        report: &mut BotSyncReport,
    ) -> PositionResult<()> {
        // An unfilled entry is not expected on the exchange yet.
        if !row.status.expects_exchange_position() {
            return Ok(());
        }
        if row.is_locked(self.clock.now_ms(), config.stale_lock_ms) {
            report.skipped_locked += 1;
            return Ok(());
        }

        let count = row.not_on_exchange_count.saturating_add(1);
        match config.not_on_exchange_close_threshold {
            Some(threshold) if count >= threshold => {
                let last_price = exchange.get_ticker_price(&row.symbol).await.ok();
                let closed = self
                    .close(row, CloseReason::SyncNotOnExchange, last_price, report)
                    .await?;
                if closed {
                    report.closed_missing += 1;
                    Metrics::reconcile_action("closed_missing");
                }
            }
            _ => {
                let mut updated = row.clone();
                updated.not_on_exchange_count = count;
                if self.write(updated, report).await?.is_some() {
                    report.missing_counted += 1;
                    debug!(
                        position_id = %row.id,
                        not_on_exchange_count = count,
                        "Position absent from exchange snapshot"
                    );
                }
            }
        }
        Ok(())
    }

    /// Create a local row for an untracked exchange position.
    ///
    /// An open entry order is preferred as the source; otherwise the bot's
    /// active strategy on the symbol supplies the exit parameters.
    async fn materialize(
        &self,
        bot_id: BotId,
        remote: &ExchangePosition,
        exchange: &SharedExchange,
        report: &mut BotSyncReport,
    ) -> PositionResult<()> {
        let symbol = remote.normalized_symbol.as_str();
        let bot = self.store.get_bot(bot_id).await?;
        let entry = self
            .store
            .find_open_entry_order(bot_id, symbol, remote.side)
            .await?;

        let (new, source) = match &entry {
            Some(entry) => {
                let strategy = self.store.get_strategy(entry.strategy_id).await?;
                let entry_price = if entry.entry_price > 0.0 {
                    entry.entry_price
                } else {
                    remote.reference_price().unwrap_or(entry.entry_price)
                };
                let quantity = if entry.quantity > 0.0 {
                    entry.quantity
                } else {
                    remote.contracts
                };
                let targets = strategy
                    .as_ref()
                    .map(|s| {
                        ExitTargets::derive(s, bot.as_ref(), entry_price, quantity, remote.side)
                    })
                    .unwrap_or_default();
                let new = NewPosition {
                    bot_id,
                    strategy_id: Some(entry.strategy_id),
                    exchange: exchange.exchange(),
                    symbol: remote.symbol.clone(),
                    side: remote.side,
                    entry_price,
                    amount: entry.amount,
                    quantity,
                    status: PositionStatus::Open,
                    entry_order_id: Some(entry.order_id.clone()),
                    tp_price: targets.take_profit,
                    stop_loss_price: targets.stop_loss,
                    current_reduce: strategy.as_ref().map(|s| s.trailing_decay(remote.side)),
                    reservation_token: entry.reservation_token.clone(),
                    opened_at_ms: self.clock.now_ms(),
                };
                (new, "entry_order")
            }
            None => {
                let Some(strategy) = self.store.find_active_strategy(bot_id, symbol).await? else {
                    report.untracked += 1;
                    let key = format!("untracked:{bot_id}:{symbol}:{}", remote.side);
                    self.throttled_warn(&key, |suppressed| {
                        warn!(
                            bot_id = %bot_id,
                            symbol = %remote.symbol,
                            side = %remote.side,
                            contracts = remote.contracts,
                            suppressed,
                            "Exchange position has no entry order or strategy, leaving untracked"
                        );
                    });
                    return Ok(());
                };
                let Some(entry_price) = remote.reference_price() else {
                    report.untracked += 1;
                    warn!(
                        bot_id = %bot_id,
                        symbol = %remote.symbol,
                        "Exchange position has no usable price, leaving untracked"
                    );
                    return Ok(());
                };
                let targets = ExitTargets::derive(
                    &strategy,
                    bot.as_ref(),
                    entry_price,
                    remote.contracts,
                    remote.side,
                );
                let new = NewPosition {
                    bot_id,
                    strategy_id: Some(strategy.id),
                    exchange: exchange.exchange(),
                    symbol: remote.symbol.clone(),
                    side: remote.side,
                    entry_price,
                    amount: entry_price * remote.contracts,
                    quantity: remote.contracts,
                    status: PositionStatus::Open,
                    entry_order_id: None,
                    tp_price: targets.take_profit,
                    stop_loss_price: targets.stop_loss,
                    current_reduce: Some(strategy.trailing_decay(remote.side)),
                    reservation_token: None,
                    opened_at_ms: self.clock.now_ms(),
                };
                (new, "strategy")
            }
        };

        // Re-check right before the insert: an entry fill or another pass
        // may have created the row since the snapshot was taken.
        if let Some(existing) = self.store.find_active(bot_id, symbol, remote.side).await? {
            report.skipped_duplicate += 1;
            debug!(
                position_id = %existing.id,
                symbol = %remote.symbol,
                side = %remote.side,
                "Row appeared concurrently, not materializing"
            );
            return Ok(());
        }
        let position = match self.store.insert_position(new).await {
            Ok(position) => position,
            Err(StoreError::Duplicate(key)) => {
                report.skipped_duplicate += 1;
                debug!(key = %key, "Insert lost to a concurrent writer");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(entry) = &entry {
            self.consume_entry_order(entry).await?;
        }
        report.materialized += 1;
        Metrics::reconcile_action("materialized");
        info!(
            position_id = %position.id,
            bot_id = %bot_id,
            symbol = %position.symbol,
            side = %position.side,
            entry_price = position.entry_price,
            quantity = position.quantity,
            source,
            "Materialized position from exchange"
        );
        let _ = self.placer.schedule(&self.coordinator, &position, exchange.clone());
        Ok(())
    }

    /// Settle the entry order and reservation behind a promoted row.
    ///
    /// The open entry order for the slot is consumed when it is the row's
    /// own (same exchange order id, or same reservation when the row has no
    /// order id). Without one, the row's reservation is released directly.
    async fn settle_entry(&self, row: &Position) -> PositionResult<()> {
        let entry = self
            .store
            .find_open_entry_order(row.bot_id, &row.normalized_symbol, row.side)
            .await?
            .filter(|entry| match &row.entry_order_id {
                Some(order_id) => entry.order_id == *order_id,
                None => {
                    row.reservation_token.is_none()
                        || entry.reservation_token == row.reservation_token
                }
            });
        if let Some(entry) = entry {
            return self.consume_entry_order(&entry).await;
        }
        if let Some(token) = &row.reservation_token {
            let finalized = self
                .store
                .finalize_reservation(token, ReservationStatus::Released)
                .await?;
            if !finalized {
                debug!(token = %token, "Reservation already finalized");
            }
        }
        Ok(())
    }

    /// Mark the entry order filled and release its slot.
    async fn consume_entry_order(&self, entry: &EntryOrder) -> PositionResult<()> {
        self.store
            .set_entry_order_status(entry.id, EntryOrderStatus::Filled)
            .await?;
        if let Some(token) = &entry.reservation_token {
            let finalized = self
                .store
                .finalize_reservation(token, ReservationStatus::Released)
                .await?;
            if !finalized {
                debug!(token = %token, "Reservation already finalized");
            }
        }
        Ok(())
    }

    /// Close a row; returns false when another writer won.
    async fn close(
        &self,
        row: &Position,
        reason: CloseReason,
        exit_price: Option<f64>,
        report: &mut BotSyncReport,
    ) -> PositionResult<bool> {
        let pnl = exit_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .and_then(|exit| {
                pnl_percent(row.entry_price, exit, row.side).map(|pct| {
                    (realized_pnl(row.entry_price, exit, row.quantity, row.side), pct)
                })
            });
        let mut updated = row.clone();
        updated.mark_closed(reason.clone(), self.clock.now_ms(), pnl);
        let closed = self.write(updated, report).await?.is_some();
        if closed {
            info!(
                position_id = %row.id,
                bot_id = %row.bot_id,
                symbol = %row.symbol,
                side = %row.side,
                reason = %reason,
                pnl = ?pnl.map(|(abs, _)| abs),
                "Position closed by reconciliation"
            );
        }
        Ok(closed)
    }

    /// Cancel redundant exit orders. Failures here never fail the pass.
    async fn dedup_exit_orders(
        &self,
        bot_id: BotId,
        exchange: &SharedExchange,
        local: &[Position],
        report: &mut BotSyncReport,
    ) {
        let orders = match exchange.get_open_orders(None).await {
            Ok(orders) => orders,
            Err(err) => {
                Metrics::exchange_error(Operation::GetOpenOrders.as_str(), err.kind.as_str());
                self.throttled_warn(&format!("orders_failed:{bot_id}"), |suppressed| {
                    warn!(
                        bot_id = %bot_id,
                        error = %err,
                        suppressed,
                        "Open-order fetch failed, skipping dedup"
                    );
                });
                return;
            }
        };

        for order in redundant_exit_orders(&orders, local) {
            match exchange.cancel_order(&order.order_id, &order.symbol).await {
                Ok(()) => {
                    report.exit_cancelled += 1;
                    Metrics::order_cancelled("duplicate");
                    Metrics::reconcile_action("exit_cancelled");
                    info!(
                        bot_id = %bot_id,
                        order_id = %order.order_id,
                        symbol = %order.symbol,
                        order_type = %order.order_type,
                        "Cancelled duplicate exit order"
                    );
                }
                Err(err) if err.kind == ExchangeErrorKind::OrderNotFound => {
                    debug!(order_id = %order.order_id, "Duplicate exit order already gone");
                }
                Err(err) => {
                    report.failed_actions += 1;
                    Metrics::exchange_error(Operation::CancelOrder.as_str(), err.kind.as_str());
                    warn!(
                        bot_id = %bot_id,
                        order_id = %order.order_id,
                        error = %err,
                        "Failed to cancel duplicate exit order"
                    );
                }
            }
        }
    }

    /// Versioned write; `None` when another writer won the race.
    async fn write(
        &self,
        mut row: Position,
        report: &mut BotSyncReport,
    ) -> PositionResult<Option<Position>> {
        match self.store.update_position(row.clone()).await? {
            UpdateOutcome::Applied { new_version } => {
                row.row_version = new_version;
                Ok(Some(row))
            }
            UpdateOutcome::Conflict { current_version } => {
                report.conflicts += 1;
                debug!(
                    position_id = %row.id,
                    expected = row.row_version,
                    current_version,
                    "Reconcile write lost the race, retrying next pass"
                );
                Ok(None)
            }
        }
    }

    /// Emit through `emit` at most once per window for `key`, passing the
    /// number of occurrences suppressed since the last emission.
    fn throttled_warn(&self, key: &str, emit: impl FnOnce(u64)) {
        if let Some(suppressed) = self.throttle.read().check(key) {
            emit(suppressed);
        }
    }

    /// Open row missing an exit order it should have.
    ///
    /// A missing leg only counts when its price is stored or derivable from
    /// the strategy; a row whose strategy yields no target for that leg
    /// would otherwise be re-enqueued every pass.
    async fn needs_exit_repair(&self, row: &Position) -> PositionResult<bool> {
        if row.status != PositionStatus::Open {
            return Ok(false);
        }
        let missing_tp = !row.has_take_profit_order();
        let missing_sl = !row.has_stop_loss_order();
        if !missing_tp && !missing_sl {
            return Ok(false);
        }
        let targets = self.exit_targets(row).await?;
        Ok((missing_tp && targets.take_profit.is_some())
            || (missing_sl && targets.stop_loss.is_some()))
    }

    /// Stored exit prices, with the strategy filling the gaps.
    async fn exit_targets(&self, row: &Position) -> PositionResult<ExitTargets> {
        let mut targets = ExitTargets {
            take_profit: row.tp_price,
            stop_loss: row.stop_loss_price,
        };
        if targets.take_profit.is_some() && targets.stop_loss.is_some() {
            return Ok(targets);
        }
        let strategy = match row.strategy_id {
            Some(id) => self.store.get_strategy(id).await?,
            None => None,
        };
        if let Some(strategy) = strategy {
            let bot = self.store.get_bot(row.bot_id).await?;
            let derived = ExitTargets::derive(
                &strategy,
                bot.as_ref(),
                row.entry_price,
                row.quantity,
                row.side,
            );
            targets.take_profit = targets.take_profit.or(derived.take_profit);
            targets.stop_loss = targets.stop_loss.or(derived.stop_loss);
        }
        Ok(targets)
    }
}
