//! Reconciler configuration.

use serde::{Deserialize, Serialize};

/// Default reconcile interval (seconds).
pub const SYNC_INTERVAL_SECS: u64 = 60;

/// Settings read at the start of every pass, so they can be swapped between
/// cycles with [`PositionReconciler::update_config`](crate::PositionReconciler::update_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Seconds between timer-driven passes.
    pub sync_interval_secs: u64,

    /// Consecutive passes a row may be absent from the exchange before it is
    /// force-closed. `None` never force-closes.
    pub not_on_exchange_close_threshold: Option<u32>,

    /// A soft lock older than this is treated as abandoned.
    pub stale_lock_ms: u64,

    /// Window for repeated per-bot warnings.
    pub log_throttle_window_ms: u64,

    /// Read exchange positions through the coordinator's snapshot cache.
    pub cached_snapshots: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: SYNC_INTERVAL_SECS,
            not_on_exchange_close_threshold: None,
            stale_lock_ms: 60_000,
            log_throttle_window_ms: 60_000,
            cached_snapshots: false,
        }
    }
}
