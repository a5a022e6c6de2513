//! Order scheduling configuration.

use ocbot_queue::PriorityConfig;
use serde::{Deserialize, Serialize};

/// Settings for the per-bot schedulers and the global coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
    /// Concurrent placements per bot.
    pub per_bot_concurrency: usize,
    /// Concurrent placements across all bots.
    pub global_concurrency: usize,
    /// Per-attempt timeout; 0 disables it.
    pub task_timeout_ms: u64,
    /// Pending tasks per bot; 0 means unbounded.
    pub queue_max_size: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_cap_ms: u64,
    /// Exchange-position snapshot lifetime.
    pub snapshot_ttl_ms: u64,
    /// A soft lock older than this is treated as abandoned.
    pub stale_lock_ms: u64,
    /// Re-read attempts after losing a versioned write.
    pub max_version_retries: u32,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            per_bot_concurrency: 2,
            global_concurrency: 4,
            task_timeout_ms: 30_000,
            queue_max_size: 200,
            max_retries: 3,
            base_delay_ms: 500,
            backoff_cap_ms: 10_000,
            snapshot_ttl_ms: 3_000,
            stale_lock_ms: 60_000,
            max_version_retries: 3,
        }
    }
}

impl OrdersConfig {
    /// Queue settings for one bot's scheduler.
    pub fn scheduler_config(&self) -> PriorityConfig {
        PriorityConfig {
            concurrency: self.per_bot_concurrency.max(1),
            max_size: self.queue_max_size,
            task_timeout_ms: self.task_timeout_ms,
            max_retries: self.max_retries,
            base_delay_ms: self.base_delay_ms,
            backoff_cap_ms: self.backoff_cap_ms,
        }
    }
}
