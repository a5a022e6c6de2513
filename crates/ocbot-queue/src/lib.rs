//! In-process async task queues.
//!
//! Both variants share one engine ([`TaskQueue`]):
//! - [`LifoQueue`]: most recently pushed first, linear backoff. Used for
//!   latency-tolerant background recomputation.
//! - [`PriorityQueue`]: highest priority first, exponential backoff capped,
//!   per-attempt timeout. Used for exit-order placement.
//!
//! Common contract:
//! - `push` returns a [`TaskHandle`] resolving to the task's result.
//! - Keyed tasks supersede a pending task with the same key; the loser
//!   resolves to [`QueueError::Superseded`].
//! - At `max_size` the weakest pending task is evicted with
//!   [`QueueError::Overflow`] before the new task is accepted.
//! - Errors that report `is_retryable() == false` fail immediately.
//!
//! Dispatch is deferred to a spawned pump, so a burst of pushes made without
//! yielding is ordered as a whole before any task starts. `push` must be
//! called from within a Tokio runtime.

pub mod config;
pub mod error;
pub mod lifo;
pub mod priority;
pub mod queue;
pub mod stats;
pub mod task;

#[cfg(test)]
mod test_support;

pub use config::{Backoff, Discipline, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use lifo::{LifoConfig, LifoQueue};
pub use priority::{PriorityConfig, PriorityQueue};
pub use queue::TaskQueue;
pub use stats::QueueMetrics;
pub use task::{Job, TaskHandle, TaskSpec};
