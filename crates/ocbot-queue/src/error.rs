//! Queue error types.

use thiserror::Error;

/// Terminal outcome of a task that did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError<E> {
    /// A newer task with the same key replaced this one. Benign.
    #[error("task superseded: {key}")]
    Superseded { key: String },

    /// Evicted because the queue was at capacity.
    #[error("task dropped - overflow ({})", .key.as_deref().unwrap_or("unkeyed"))]
    Overflow { key: Option<String> },

    /// Every attempt timed out.
    #[error("task timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// The task's last error, after retries or on a non-retryable error.
    #[error("task failed after {attempts} attempt(s): {error}")]
    Failed { attempts: u32, error: E },

    /// The task panicked.
    #[error("task panicked on attempt {attempts}")]
    Panicked { attempts: u32 },

    /// The queue was closed before the task ran.
    #[error("queue closed")]
    Closed,
}

impl<E> QueueError<E> {
    /// Check if this outcome means "replaced by newer work", not "broken".
    ///
    /// Benign outcomes must not trigger alerting.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }

    /// The task's own error, if the failure came from the task.
    pub fn task_error(&self) -> Option<&E> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Metric label for this outcome.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Superseded { .. } => "superseded",
            Self::Overflow { .. } => "dropped",
            Self::Timeout { .. } => "timed_out",
            Self::Failed { .. } | Self::Panicked { .. } => "failed",
            Self::Closed => "closed",
        }
    }
}

pub type QueueResult<T, E> = Result<T, QueueError<E>>;
