//! Task definition and completion handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use ocbot_core::BoxFuture;
use tokio::sync::oneshot;

use crate::error::QueueError;

/// Unit of work. Called once per attempt.
pub type Job<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A task to push into a queue.
pub struct TaskSpec<T, E> {
    pub(crate) key: Option<String>,
    pub(crate) priority: i64,
    pub(crate) max_retries: Option<u32>,
    pub(crate) base_delay: Option<Duration>,
    pub(crate) job: Job<T, E>,
}

impl<T, E> TaskSpec<T, E> {
    /// Create a task from a closure producing one attempt's future.
    pub fn new<F, Fut>(job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::from_job(Arc::new(move || Box::pin(job()) as BoxFuture<'static, _>))
    }

    pub fn from_job(job: Job<T, E>) -> Self {
        Self {
            key: None,
            priority: 0,
            max_retries: None,
            base_delay: None,
            job,
        }
    }

    /// Dedup identity, e.g. `tpsl:{position_id}`.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Higher runs first in the priority variant.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Replace the job, keeping key, priority and retry settings.
    #[must_use]
    pub fn map_job(mut self, wrap: impl FnOnce(Job<T, E>) -> Job<T, E>) -> Self {
        self.job = wrap(self.job);
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }
}

impl<T, E> std::fmt::Debug for TaskSpec<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

/// Resolves with the task's result or terminal queue error.
///
/// Dropping the handle does not cancel the task.
#[must_use = "the handle resolves to the task outcome"]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, QueueError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, QueueError<E>>>) -> Self {
        Self { rx }
    }

    /// Handle that is already resolved.
    pub(crate) fn ready(result: Result<T, QueueError<E>>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, QueueError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Closed)))
    }
}
