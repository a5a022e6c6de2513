//! LIFO background queue.

use std::time::Duration;

use ocbot_core::Retryable;
use serde::{Deserialize, Serialize};

use crate::config::{Backoff, Discipline, QueueConfig};
use crate::queue::TaskQueue;
use crate::stats::QueueMetrics;
use crate::task::{TaskHandle, TaskSpec};

/// LIFO queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifoConfig {
    pub concurrency: usize,
    /// 0 means unbounded.
    pub max_size: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for LifoConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_size: 1_000,
            max_retries: 2,
            base_delay_ms: 1_000,
        }
    }
}

/// Most-recent-first queue with linear backoff and no task timeout.
///
/// A keyed push always supersedes the pending task with the same key: only
/// the latest recomputation matters.
pub struct LifoQueue<T, E> {
    inner: TaskQueue<T, E>,
}

impl<T, E> Clone for LifoQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> LifoQueue<T, E>
where
    T: Clone + Send + 'static,
    E: Retryable + Clone + std::fmt::Display + Send + 'static,
{
    pub fn new(name: impl Into<String>, config: &LifoConfig) -> Self {
        Self {
            inner: TaskQueue::new(QueueConfig {
                name: name.into(),
                discipline: Discipline::Lifo,
                concurrency: config.concurrency,
                max_size: config.max_size,
                task_timeout: None,
                backoff: Backoff::Linear,
                default_max_retries: config.max_retries,
                default_base_delay: Duration::from_millis(config.base_delay_ms),
            }),
        }
    }

    pub fn push(&self, spec: TaskSpec<T, E>) -> TaskHandle<T, E> {
        self.inner.push(spec)
    }

    pub fn metrics(&self) -> QueueMetrics {
        self.inner.metrics()
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}
