//! Position reconciliation.
//!
//! Keeps the local position ledger consistent with what each bot's exchange
//! account reports.
//!
//! # Key Components
//!
//! - [`PositionReconciler`]: periodic and on-demand per-bot diff and repair
//! - [`ReconcilerConfig`]: hot-reloadable reconcile settings
//! - [`BotSyncReport`], [`SyncSummary`]: what a pass did
//! - [`redundant_exit_orders`]: duplicate exit-order selection

pub mod config;
pub mod dedup;
pub mod error;
pub mod reconciler;
pub mod report;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ReconcilerConfig;
pub use dedup::redundant_exit_orders;
pub use error::{PositionError, PositionResult};
pub use reconciler::PositionReconciler;
pub use report::{BotSyncReport, SyncOutcome, SyncSummary};
