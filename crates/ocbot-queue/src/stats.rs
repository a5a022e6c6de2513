//! Queue counters.

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    pub pending: usize,
    pub in_flight: usize,
    /// Tasks that completed successfully.
    pub processed: u64,
    /// Tasks evicted for capacity.
    pub dropped: u64,
    /// Attempts that hit the task timeout (a task may time out several times).
    pub timed_out: u64,
    /// Tasks that ended in an error after their last attempt.
    pub failed: u64,
    pub superseded: u64,
    /// Keyed pushes folded into an existing pending task.
    pub coalesced: u64,
}

impl QueueMetrics {
    /// Tasks that reached a terminal outcome.
    pub fn settled(&self) -> u64 {
        self.processed + self.dropped + self.failed + self.superseded
    }
}
