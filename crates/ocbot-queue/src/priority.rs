//! Priority queue with per-attempt timeout.

use std::time::Duration;

use ocbot_core::Retryable;
use serde::{Deserialize, Serialize};

use crate::config::{Backoff, Discipline, QueueConfig};
use crate::queue::TaskQueue;
use crate::stats::QueueMetrics;
use crate::task::{TaskHandle, TaskSpec};

/// Priority queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub concurrency: usize,
    /// 0 means unbounded.
    pub max_size: usize,
    pub task_timeout_ms: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_size: 200,
            task_timeout_ms: 30_000,
            max_retries: 3,
            base_delay_ms: 500,
            backoff_cap_ms: 10_000,
        }
    }
}

/// Highest-priority-first queue.
///
/// Each attempt races `task_timeout_ms`; a timed-out attempt counts as a
/// retryable failure while the underlying call keeps running. Retries back
/// off exponentially up to `backoff_cap_ms`.
pub struct PriorityQueue<T, E> {
    inner: TaskQueue<T, E>,
}

impl<T, E> Clone for PriorityQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> PriorityQueue<T, E>
where
    T: Clone + Send + 'static,
    E: Retryable + Clone + std::fmt::Display + Send + 'static,
{
    pub fn new(name: impl Into<String>, config: &PriorityConfig) -> Self {
        let task_timeout = (config.task_timeout_ms > 0)
            .then(|| Duration::from_millis(config.task_timeout_ms));
        Self {
            inner: TaskQueue::new(QueueConfig {
                name: name.into(),
                discipline: Discipline::Priority,
                concurrency: config.concurrency,
                max_size: config.max_size,
                task_timeout,
                backoff: Backoff::Exponential {
                    cap: Duration::from_millis(config.backoff_cap_ms),
                },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::test_support::TestError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn config(concurrency: usize, max_size: usize) -> PriorityConfig {
        PriorityConfig {
            concurrency,
            max_size,
            task_timeout_ms: 1_000,
            max_retries: 2,
            base_delay_ms: 100,
            backoff_cap_ms: 1_000,
        }
    }

    fn counted(calls: &Arc<AtomicU32>, value: u32) -> TaskSpec<u32, TestError> {
        let calls = calls.clone();
        TaskSpec::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }
        })
    }

    fn slow(value: u32) -> TaskSpec<u32, TestError> {
        TaskSpec::new(move || async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(value)
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_priority_supersedes() {
        let q = PriorityQueue::new("prio-test", &config(1, 0));
        let first_calls = Arc::new(AtomicU32::new(0));
        let second_calls = Arc::new(AtomicU32::new(0));

        let first = q.push(counted(&first_calls, 1).with_key("tpsl:7").with_priority(10));
        let second = q.push(counted(&second_calls, 2).with_key("tpsl:7").with_priority(20));

        assert_eq!(
            first.await,
            Err(QueueError::Superseded {
                key: "tpsl:7".to_string()
            })
        );
        assert_eq!(second.await, Ok(2));
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(q.metrics().superseded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lower_priority_joins_existing_task() {
        let q = PriorityQueue::new("prio-test", &config(1, 0));
        let first_calls = Arc::new(AtomicU32::new(0));
        let second_calls = Arc::new(AtomicU32::new(0));

        let first = q.push(counted(&first_calls, 1).with_key("tpsl:7").with_priority(20));
        let second = q.push(counted(&second_calls, 2).with_key("tpsl:7").with_priority(20));

        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Ok(1));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(q.metrics().coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_evicts_lowest_priority() {
        let q = PriorityQueue::new("prio-test", &config(1, 2));

        let a = q.push(slow(1).with_key("A").with_priority(1));
        let b = q.push(slow(2).with_key("B").with_priority(2));
        let c = q.push(slow(3).with_key("C").with_priority(3));

        let a = a.await;
        assert!(matches!(a, Err(QueueError::Overflow { .. })));
        assert_eq!(b.await, Ok(2));
        assert_eq!(c.await, Ok(3));

        let metrics = q.metrics();
        assert_eq!(metrics.dropped, 1);
        assert_eq!(metrics.processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_position_drains_first() {
        let q: PriorityQueue<_, TestError> = PriorityQueue::new("prio-test", &config(1, 0));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        // Priority is position age in ms: older positions are serviced first.
        let ages = [5_000_i64, 90_000, 30_000];
        let handles: Vec<_> = ages
            .iter()
            .map(|&age| {
                let order = order.clone();
                q.push(
                    TaskSpec::new(move || {
                        let order = order.clone();
                        async move {
                            order.lock().push(age);
                            Ok(0)
                        }
                    })
                    .with_priority(age),
                )
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![90_000, 30_000, 5_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_backoff_then_success() {
        let q = PriorityQueue::new("prio-test", &config(1, 0));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let started = Instant::now();
        let result = q
            .push(TaskSpec::new(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(TestError::transient())
                    } else {
                        Ok(9)
                    }
                }
            }))
            .await;

        assert_eq!(result, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 200ms after attempt 1, 400ms after attempt 2.
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let q = PriorityQueue::new("prio-test", &config(1, 0));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = q
            .push(TaskSpec::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(TestError::fatal()) }
            }))
            .await;

        assert_eq!(
            result,
            Err(QueueError::Failed {
                attempts: 1,
                error: TestError::fatal()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_and_does_not_cancel_work() {
        let q: PriorityQueue<_, TestError> = PriorityQueue::new("prio-test", &config(1, 0));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = q
            .push(
                TaskSpec::new(move || {
                    let flag = flag.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        flag.store(true, Ordering::SeqCst);
                        Ok(1)
                    }
                })
                .with_max_retries(1),
            )
            .await;

        assert_eq!(result, Err(QueueError::Timeout { attempts: 2 }));
        assert_eq!(q.metrics().timed_out, 2);
        assert!(!finished.load(Ordering::SeqCst));

        // The abandoned attempts keep running to completion.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
