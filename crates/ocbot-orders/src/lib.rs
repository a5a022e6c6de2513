//! Exit-order scheduling for ocbot.
//!
//! - [`OrderPlacementScheduler`]: one priority queue per bot, oldest position first
//! - [`GlobalOrderCoordinator`]: lazy per-bot schedulers behind one global
//!   concurrency ceiling, plus the exchange-position snapshot cache
//! - [`ExitOrderPlacer`]: the `tpsl:{position_id}` unit of work
//! - [`TrailingService`]: per-minute trailing take-profit driver

pub mod config;
pub mod coordinator;
pub mod error;
pub mod exit_placer;
pub mod outcome;
pub mod scheduler;
pub mod snapshot_cache;
pub mod trailing;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::OrdersConfig;
pub use coordinator::{CoordinatorMetrics, GlobalOrderCoordinator};
pub use error::{OrderError, OrderResult};
pub use exit_placer::{exit_task_key, ExitOrderPlacer};
pub use outcome::{OrderOutcome, SkipReason, TrailOutcome};
pub use scheduler::OrderPlacementScheduler;
pub use snapshot_cache::SnapshotCache;
pub use trailing::{trail_task_key, TrailingService};
