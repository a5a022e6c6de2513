//! Main application.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use ocbot_core::{BotId, SharedClock, SystemClock};
use ocbot_exchange::PaperExchange;
use ocbot_orders::trailing::TrailHandle;
use ocbot_orders::{ExitOrderPlacer, GlobalOrderCoordinator, TrailOutcome, TrailingService};
use ocbot_position::{PositionReconciler, SyncOutcome};
use ocbot_store::MemoryStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// What one synchronous [`Application::run_cycle`] did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Paper trigger orders that filled before the pass.
    pub fills: Vec<String>,
    pub sync: SyncOutcome,
    /// Results of the trailing jobs that completed.
    pub trailing: Vec<TrailOutcome>,
}

/// Main application state.
pub struct Application {
    config: AppConfig,
    store: Arc<MemoryStore>,
    exchanges: BTreeMap<BotId, Arc<PaperExchange>>,
    coordinator: Arc<GlobalOrderCoordinator>,
    reconciler: Arc<PositionReconciler>,
    trailing: Arc<TrailingService>,
}

impl Application {
    /// Create a new application on the system clock.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a new application on `clock`.
    pub fn with_clock(config: AppConfig, clock: SharedClock) -> AppResult<Self> {
        config.validate()?;

        let store = Arc::new(MemoryStore::new(clock.clone()));
        for bot in &config.bots {
            store.insert_bot(bot.clone());
        }
        for strategy in &config.strategies {
            store.insert_strategy(strategy.clone());
        }

        let coordinator = Arc::new(GlobalOrderCoordinator::new(
            config.orders.clone(),
            clock.clone(),
        ));
        let placer = Arc::new(ExitOrderPlacer::new(
            store.clone(),
            clock.clone(),
            &config.orders,
        ));
        let reconciler = Arc::new(PositionReconciler::new(
            store.clone(),
            clock.clone(),
            coordinator.clone(),
            placer.clone(),
            config.reconciler_config(),
        ));
        let trailing = Arc::new(TrailingService::new(
            store.clone(),
            clock.clone(),
            coordinator.clone(),
            placer,
            &config.background,
        ));

        let mut exchanges = BTreeMap::new();
        for bot in config.bots.iter().filter(|b| b.is_active) {
            let exchange = Arc::new(PaperExchange::new(bot.exchange, clock.clone()));
            for seed in config.paper.positions.iter().filter(|s| s.bot_id == bot.id) {
                exchange.set_ticker(&seed.symbol, seed.ticker());
                exchange.set_position(&seed.symbol, seed.side, seed.contracts, seed.entry_price);
            }
            reconciler.register_exchange(bot.id, exchange.clone());
            exchanges.insert(bot.id, exchange);
        }

        info!(
            bots = exchanges.len(),
            strategies = config.strategies.len(),
            seeded_positions = config.paper.positions.len(),
            "Application initialized in paper mode"
        );

        Ok(Self {
            config,
            store,
            exchanges,
            coordinator,
            reconciler,
            trailing,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Paper exchange of an active bot.
    pub fn exchange(&self, bot_id: BotId) -> Option<Arc<PaperExchange>> {
        self.exchanges.get(&bot_id).cloned()
    }

    pub fn coordinator(&self) -> &Arc<GlobalOrderCoordinator> {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &Arc<PositionReconciler> {
        &self.reconciler
    }

    pub fn trailing(&self) -> &Arc<TrailingService> {
        &self.trailing
    }

    // ========================================================================
    // Cycle steps
    // ========================================================================

    /// Fill paper trigger orders crossed by the current tickers.
    pub fn fill_paper_orders(&self) -> Vec<String> {
        let mut fired = Vec::new();
        for (bot_id, exchange) in &self.exchanges {
            let filled = exchange.trigger_exit_orders();
            if !filled.is_empty() {
                // Cached snapshots predate the fill.
                self.coordinator.snapshots().invalidate(*bot_id);
                info!(bot_id = %bot_id, count = filled.len(), "Paper exit orders filled");
                fired.extend(filled);
            }
        }
        fired
    }

    /// Queue trailing steps for every bot. A bot whose positions cannot be
    /// read is skipped.
    pub async fn tick_trailing(&self) -> Vec<TrailHandle> {
        let mut handles = Vec::new();
        for (bot_id, exchange) in &self.exchanges {
            match self.trailing.tick(*bot_id, exchange.clone()).await {
                Ok(queued) => handles.extend(queued),
                Err(err) => warn!(bot_id = %bot_id, error = %err, "Trailing tick failed"),
            }
        }
        handles
    }

    /// Fill check, reconcile pass and trailing step, waiting for the
    /// trailing jobs to finish.
    pub async fn run_cycle(&self) -> AppResult<CycleReport> {
        let fills = self.fill_paper_orders();
        let sync = self.reconciler.sync_positions().await?;

        let handles = if self.config.trailing.enabled {
            self.tick_trailing().await
        } else {
            Vec::new()
        };
        let mut trailing = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(outcome) => trailing.push(outcome),
                Err(err) => warn!(error = %err, "Trailing job failed"),
            }
        }

        Ok(CycleReport {
            fills,
            sync,
            trailing,
        })
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Run the timers until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let reconcile = tokio::spawn(self.reconciler.clone().run(cancel.clone()));

        // Seeded positions get exit orders without waiting a full interval.
        match self.reconciler.sync_positions().await {
            Ok(outcome) => debug!(?outcome, "Startup reconcile pass"),
            Err(err) => warn!(error = %err, "Startup reconcile pass failed"),
        }

        let mut trailing_interval =
            tokio::time::interval(Duration::from_secs(self.config.trailing.interval_secs.max(1)));
        trailing_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fill_interval =
            tokio::time::interval(Duration::from_millis(self.config.paper.fill_interval_ms.max(1)));
        fill_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            sync_interval_secs = self.reconciler.config().sync_interval_secs,
            trailing_enabled = self.config.trailing.enabled,
            "Main loop started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = trailing_interval.tick(), if self.config.trailing.enabled => {
                    let handles = self.tick_trailing().await;
                    debug!(queued = handles.len(), "Trailing jobs queued");
                }

                _ = fill_interval.tick() => {
                    self.fill_paper_orders();
                }
            }
        }

        cancel.cancel();
        reconcile
            .await
            .map_err(|e| AppError::Task(format!("reconciler: {e}")))?;
        self.trailing.close();
        self.coordinator.shutdown();

        let totals = self.coordinator.metrics().totals();
        let trailing = self.trailing.metrics();
        info!(
            orders_processed = totals.processed,
            orders_failed = totals.failed,
            orders_dropped = totals.dropped,
            orders_timed_out = totals.timed_out,
            trailing_processed = trailing.processed,
            active_positions = self.store.all_positions().iter().filter(|p| p.is_active()).count(),
            "Shutting down"
        );
        Ok(())
    }
}
