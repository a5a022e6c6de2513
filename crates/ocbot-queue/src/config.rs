//! Queue engine configuration.

use std::time::Duration;

/// Which pending task runs next, and which is evicted on overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Most recently pushed first; priority breaks ties between pushes made
    /// at the same instant. Overflow evicts the oldest.
    Lifo,
    /// Highest priority first; FIFO among equal priorities. Overflow evicts
    /// the lowest priority, newest first among equals. A keyed push only
    /// supersedes a strictly lower priority; otherwise it joins the pending
    /// task as an extra waiter.
    Priority,
}

/// Delay between a failed attempt and the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `min(base * 2^attempt, cap)`
    Exponential { cap: Duration },
}

impl Backoff {
    /// Delay after `attempt` failed attempts (1-based).
    pub fn delay(&self, base: Duration, attempt: u32) -> Duration {
        match self {
            Self::Linear => base.saturating_mul(attempt),
            Self::Exponential { cap } => {
                let factor = 1u32 << attempt.min(30);
                base.saturating_mul(factor).min(*cap)
            }
        }
    }
}

/// Engine configuration shared by both queue variants.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Metric label and log field.
    pub name: String,
    pub discipline: Discipline,
    /// Maximum concurrently executing tasks (minimum 1).
    pub concurrency: usize,
    /// Maximum pending tasks; 0 means unbounded.
    pub max_size: usize,
    /// Per-attempt timeout. The attempt keeps running in the background; only
    /// the queue stops waiting for it.
    pub task_timeout: Option<Duration>,
    pub backoff: Backoff,
    /// Retries for tasks that do not set their own.
    pub default_max_retries: u32,
    /// Base delay for tasks that do not set their own.
    pub default_base_delay: Duration,
}
