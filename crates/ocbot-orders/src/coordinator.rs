//! Global order coordinator.
//!
//! Owns one [`OrderPlacementScheduler`] per bot, created on first use, and
//! composes every bot's own concurrency with a global ceiling: each job
//! first takes a permit from a shared semaphore (FIFO wake order), runs,
//! then hands the permit to the oldest waiter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ocbot_core::{BotId, BoxFuture, ExchangePosition, SharedClock};
use ocbot_exchange::{ExchangeClient, ExchangeResult};
use ocbot_queue::{Job, QueueMetrics};
use ocbot_telemetry::Metrics;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::OrdersConfig;
use crate::error::OrderError;
use crate::outcome::OrderOutcome;
use crate::scheduler::{OrderHandle, OrderPlacementScheduler, OrderTask};
use crate::snapshot_cache::SnapshotCache;

/// Coordinator-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Jobs currently holding a global permit.
    pub global_in_flight: usize,
    /// Highest `global_in_flight` observed.
    pub global_peak: usize,
    pub per_bot: BTreeMap<BotId, QueueMetrics>,
}

impl CoordinatorMetrics {
    /// Sum of every bot's counters.
    pub fn totals(&self) -> QueueMetrics {
        self.per_bot
            .values()
            .fold(QueueMetrics::default(), |mut acc, m| {
                acc.pending += m.pending;
                acc.in_flight += m.in_flight;
                acc.processed += m.processed;
                acc.dropped += m.dropped;
                acc.timed_out += m.timed_out;
                acc.failed += m.failed;
                acc.superseded += m.superseded;
                acc.coalesced += m.coalesced;
                acc
            })
    }
}

/// Releases the in-flight count even if the job panics.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst) - 1;
        Metrics::global_in_flight_set(now);
    }
}

/// Entry point for all exit-order work.
pub struct GlobalOrderCoordinator {
    config: OrdersConfig,
    schedulers: DashMap<BotId, OrderPlacementScheduler>,
    global: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    snapshots: SnapshotCache,
}

impl GlobalOrderCoordinator {
    pub fn new(config: OrdersConfig, clock: SharedClock) -> Self {
        info!(
            per_bot = config.per_bot_concurrency,
            global = config.global_concurrency,
            "Order coordinator ready"
        );
        Self {
            global: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            snapshots: SnapshotCache::new(config.snapshot_ttl_ms, clock),
            config,
            schedulers: DashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &OrdersConfig {
        &self.config
    }

    /// The bot's scheduler, created on first use.
    pub fn scheduler(&self, bot_id: BotId) -> OrderPlacementScheduler {
        self.schedulers
            .entry(bot_id)
            .or_insert_with(|| {
                debug!(bot_id = %bot_id, "Creating order scheduler");
                OrderPlacementScheduler::new(bot_id, &self.config)
            })
            .clone()
    }

    /// Schedule `task` on the bot's queue behind the global ceiling.
    pub fn push_task(&self, bot_id: BotId, task: OrderTask) -> OrderHandle {
        let task = task.map_job(|job| self.gate(job));
        self.scheduler(bot_id).push(task)
    }

    fn gate(&self, job: Job<OrderOutcome, OrderError>) -> Job<OrderOutcome, OrderError> {
        let global = self.global.clone();
        let in_flight = self.in_flight.clone();
        let peak = self.peak.clone();
        Arc::new(move || {
            let job = job.clone();
            let global = global.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            Box::pin(async move {
                let _permit = global
                    .acquire_owned()
                    .await
                    .map_err(|_| OrderError::Shutdown)?;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                Metrics::global_in_flight_set(now);
                let _guard = InFlight(in_flight);
                job().await
            }) as BoxFuture<'static, _>
        })
    }

    /// Exchange positions for `bot_id` through the snapshot cache.
    pub async fn get_cached_exchange_positions(
        &self,
        bot_id: BotId,
        exchange: &dyn ExchangeClient,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<ExchangePosition>> {
        self.snapshots.get_or_fetch(bot_id, exchange, symbol).await
    }

    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            global_in_flight: self.in_flight.load(Ordering::SeqCst),
            global_peak: self.peak.load(Ordering::SeqCst),
            per_bot: self
                .schedulers
                .iter()
                .map(|entry| (*entry.key(), entry.value().metrics()))
                .collect(),
        }
    }

    /// Close every scheduler and stop handing out global permits.
    pub fn shutdown(&self) {
        for entry in self.schedulers.iter() {
            entry.value().close();
        }
        self.global.close();
        info!("Order coordinator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocbot_core::ManualClock;
    use ocbot_queue::{QueueError, TaskSpec};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn coordinator(per_bot: usize, global: usize) -> GlobalOrderCoordinator {
        GlobalOrderCoordinator::new(
            OrdersConfig {
                per_bot_concurrency: per_bot,
                global_concurrency: global,
                task_timeout_ms: 0,
                ..OrdersConfig::default()
            },
            Arc::new(ManualClock::new(0)),
        )
    }

    fn slow_task(
        running: &Arc<AtomicUsize>,
        max_seen: &Arc<AtomicUsize>,
    ) -> TaskSpec<OrderOutcome, OrderError> {
        let running = running.clone();
        let max_seen = max_seen.clone();
        TaskSpec::new(move || {
            let running = running.clone();
            let max_seen = max_seen.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(OrderOutcome::Unchanged)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_ceiling_across_bots() {
        let coord = Arc::new(coordinator(2, 2));
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let bots = [1, 1, 2, 2, 3];
        let handles: Vec<_> = bots
            .iter()
            .map(|&bot| coord.push_task(BotId::new(bot), slow_task(&running, &max_seen)))
            .collect();

        // Sample while the backlog drains.
        let sampler = {
            let coord = coord.clone();
            tokio::spawn(async move {
                let mut worst = 0;
                for _ in 0..40 {
                    worst = worst.max(coord.metrics().global_in_flight);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                worst
            })
        };

        for handle in handles {
            assert_eq!(handle.await, Ok(OrderOutcome::Unchanged));
        }
        assert!(sampler.await.unwrap() <= 2);
        assert_eq!(max_seen.load(Ordering::SeqCst), 2);

        let metrics = coord.metrics();
        assert_eq!(metrics.global_peak, 2);
        assert_eq!(metrics.global_in_flight, 0);
        assert_eq!(metrics.per_bot.len(), 3);
        assert_eq!(metrics.totals().processed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_created_once_per_bot() {
        let coord = coordinator(1, 4);
        coord.scheduler(BotId::new(7));
        coord.scheduler(BotId::new(7));
        assert_eq!(coord.metrics().per_bot.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_bot_backlog_drains_oldest_first() {
        let coord = coordinator(1, 4);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = [1_000_i64, 50_000, 20_000]
            .into_iter()
            .map(|age| {
                let order = order.clone();
                coord.push_task(
                    BotId::new(1),
                    TaskSpec::new(move || {
                        let order = order.clone();
                        async move {
                            order.lock().push(age);
                            Ok(OrderOutcome::Unchanged)
                        }
                    })
                    .with_key(format!("tpsl:{age}"))
                    .with_priority(age),
                )
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![50_000, 20_000, 1_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_work() {
        let coord = coordinator(1, 1);
        coord.scheduler(BotId::new(1));
        coord.shutdown();
        let result = coord
            .push_task(
                BotId::new(1),
                TaskSpec::new(|| async { Ok(OrderOutcome::Unchanged) }),
            )
            .await;
        assert_eq!(result, Err(QueueError::Closed));
    }
}
