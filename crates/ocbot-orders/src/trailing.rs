//! Trailing take-profit driver.
//!
//! Each tick pushes a `trail:{position_id}` job per open position into the
//! LIFO background queue. A job advances the take-profit by the whole
//! minutes elapsed since its last step, persists it with a versioned write
//! and schedules a TP replacement through the coordinator.

use std::sync::Arc;

use ocbot_core::{BotId, PositionId, PositionStatus, SharedClock};
use ocbot_exchange::SharedExchange;
use ocbot_pricing::next_trailing_take_profit;
use ocbot_queue::{LifoConfig, LifoQueue, QueueMetrics, TaskHandle, TaskSpec};
use ocbot_store::{SharedStore, UpdateOutcome};
use tracing::{debug, info};

use crate::coordinator::GlobalOrderCoordinator;
use crate::error::{OrderError, OrderResult};
use crate::exit_placer::ExitOrderPlacer;
use crate::outcome::{SkipReason, TrailOutcome};

const MINUTE_MS: u64 = 60_000;

pub type TrailHandle = TaskHandle<TrailOutcome, OrderError>;

/// Dedup key for a position's trailing recomputation.
pub fn trail_task_key(position_id: PositionId) -> String {
    format!("trail:{position_id}")
}

pub struct TrailingService {
    store: SharedStore,
    clock: SharedClock,
    coordinator: Arc<GlobalOrderCoordinator>,
    placer: Arc<ExitOrderPlacer>,
    queue: LifoQueue<TrailOutcome, OrderError>,
    stale_lock_ms: u64,
    max_version_retries: u32,
}

impl TrailingService {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        coordinator: Arc<GlobalOrderCoordinator>,
        placer: Arc<ExitOrderPlacer>,
        background: &LifoConfig,
    ) -> Self {
        let orders = coordinator.config().clone();
        Self {
            store,
            clock,
            coordinator,
            placer,
            queue: LifoQueue::new("trailing", background),
            stale_lock_ms: orders.stale_lock_ms,
            max_version_retries: orders.max_version_retries,
        }
    }

    /// Queue a trailing step for every open position of `bot_id` that has a
    /// take-profit.
    pub async fn tick(
        self: &Arc<Self>,
        bot_id: BotId,
        exchange: SharedExchange,
    ) -> OrderResult<Vec<TrailHandle>> {
        let now = self.clock.now_ms();
        let positions = self.store.active_positions(bot_id).await?;
        let handles: Vec<TrailHandle> = positions
            .into_iter()
            .filter(|p| p.status == PositionStatus::Open && p.tp_price.is_some())
            .map(|p| {
                let service = self.clone();
                let exchange = exchange.clone();
                let id = p.id;
                let task = TaskSpec::new(move || {
                    let service = service.clone();
                    let exchange = exchange.clone();
                    async move { service.trail(id, exchange).await }
                })
                .with_key(trail_task_key(id))
                .with_priority(i64::try_from(p.age_ms(now)).unwrap_or(i64::MAX));
                self.queue.push(task)
            })
            .collect();
        debug!(bot_id = %bot_id, queued = handles.len(), "Trailing tick");
        Ok(handles)
    }

    /// Advance one position's take-profit.
    pub async fn trail(
        &self,
        position_id: PositionId,
        exchange: SharedExchange,
    ) -> OrderResult<TrailOutcome> {
        for _ in 0..=self.max_version_retries {
            let position = self
                .store
                .get_position(position_id)
                .await?
                .ok_or(OrderError::PositionNotFound(position_id))?;
            if position.status != PositionStatus::Open {
                return Ok(TrailOutcome::Skipped(SkipReason::Inactive));
            }
            let (Some(prev), Some(initial)) = (position.tp_price, position.initial_tp_price) else {
                return Ok(TrailOutcome::Skipped(SkipReason::NoTargets));
            };
            let strategy = match position.strategy_id {
                Some(id) => self.store.get_strategy(id).await?,
                None => None,
            };
            let Some(decay) = strategy
                .map(|s| s.trailing_decay(position.side))
                .filter(|d| *d > 0.0)
            else {
                return Ok(TrailOutcome::Skipped(SkipReason::NoTargets));
            };

            let now = self.clock.now_ms();
            if position.is_locked(now, self.stale_lock_ms) {
                return Ok(TrailOutcome::Skipped(SkipReason::Locked));
            }
            let anchor = position.last_trailing_ms.unwrap_or(position.opened_at_ms);
            let whole_minutes = now.saturating_sub(anchor) / MINUTE_MS;
            if whole_minutes == 0 {
                return Ok(TrailOutcome::NotDue);
            }
            let minutes = u32::try_from(whole_minutes).unwrap_or(u32::MAX);

            let next = next_trailing_take_profit(
                prev,
                position.entry_price,
                initial,
                decay,
                position.side,
                minutes,
            );
            if (next - prev).abs() <= f64::EPSILON * prev.abs().max(1.0) {
                return Ok(TrailOutcome::Settled);
            }

            let mut updated = position.clone();
            updated.tp_price = Some(next);
            updated.minutes_elapsed = position.minutes_elapsed.saturating_add(minutes);
            updated.last_trailing_ms = Some(anchor + u64::from(minutes) * MINUTE_MS);
            updated.current_reduce = Some(decay);

            match self.store.update_position(updated.clone()).await? {
                UpdateOutcome::Applied { new_version } => {
                    updated.row_version = new_version;
                    info!(
                        position_id = %position_id,
                        bot_id = %position.bot_id,
                        side = %position.side,
                        from = prev,
                        to = next,
                        minutes,
                        "Trailing take-profit moved"
                    );
                    let _replacement = self.placer.schedule(&self.coordinator, &updated, exchange);
                    return Ok(TrailOutcome::Moved {
                        from: prev,
                        to: next,
                    });
                }
                UpdateOutcome::Conflict { current_version } => {
                    debug!(
                        position_id = %position_id,
                        current_version,
                        "Trailing write lost, re-reading"
                    );
                }
            }
        }
        Err(OrderError::StaleVersion(position_id))
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.queue.metrics()
    }

    pub fn close(&self) {
        self.queue.close();
    }
}
