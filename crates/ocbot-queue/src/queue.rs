//! Queue engine shared by the LIFO and priority variants.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use ocbot_core::Retryable;
use ocbot_telemetry::Metrics;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{Discipline, QueueConfig};
use crate::error::QueueError;
use crate::stats::QueueMetrics;
use crate::task::{Job, TaskHandle, TaskSpec};

type Waiter<T, E> = oneshot::Sender<Result<T, QueueError<E>>>;

struct Pending<T, E> {
    key: Option<String>,
    priority: i64,
    enqueued_at: Instant,
    max_retries: u32,
    base_delay: Duration,
    job: Job<T, E>,
    waiters: Vec<Waiter<T, E>>,
}

impl<T: Clone, E: Clone> Pending<T, E> {
    fn resolve(self, result: Result<T, QueueError<E>>) {
        resolve_all(self.waiters, result);
    }
}

fn resolve_all<T: Clone, E: Clone>(waiters: Vec<Waiter<T, E>>, result: Result<T, QueueError<E>>) {
    let mut waiters = waiters.into_iter().peekable();
    while let Some(tx) = waiters.next() {
        if waiters.peek().is_some() {
            let _ = tx.send(result.clone());
        } else {
            let _ = tx.send(result);
            break;
        }
    }
}

struct State<T, E> {
    /// Push sequence -> task.
    pending: BTreeMap<u64, Pending<T, E>>,
    /// Key -> push sequence, pending tasks only.
    by_key: HashMap<String, u64>,
    next_seq: u64,
    in_flight: usize,
    pump_scheduled: bool,
    closed: bool,
    counters: QueueMetrics,
}

impl<T, E> State<T, E> {
    fn remove(&mut self, seq: u64) -> Option<Pending<T, E>> {
        let task = self.pending.remove(&seq)?;
        if let Some(key) = &task.key {
            if self.by_key.get(key) == Some(&seq) {
                self.by_key.remove(key);
            }
        }
        Some(task)
    }

    /// Sequence of the task to dispatch next.
    fn next_to_run(&self, discipline: Discipline) -> Option<u64> {
        let iter = self.pending.iter();
        match discipline {
            Discipline::Lifo => iter
                .max_by_key(|(seq, t)| (t.enqueued_at, t.priority, **seq))
                .map(|(seq, _)| *seq),
            // Lowest sequence wins ties: FIFO among equal priorities.
            Discipline::Priority => iter
                .max_by_key(|(seq, t)| (t.priority, std::cmp::Reverse(**seq)))
                .map(|(seq, _)| *seq),
        }
    }

    /// Sequence of the task to evict when full.
    fn next_to_evict(&self, discipline: Discipline) -> Option<u64> {
        match discipline {
            Discipline::Lifo => self.pending.keys().next().copied(),
            Discipline::Priority => self
                .pending
                .iter()
                .min_by_key(|(seq, t)| (t.priority, std::cmp::Reverse(**seq)))
                .map(|(seq, _)| *seq),
        }
    }

    fn snapshot(&self) -> QueueMetrics {
        QueueMetrics {
            pending: self.pending.len(),
            in_flight: self.in_flight,
            ..self.counters
        }
    }
}

struct Inner<T, E> {
    config: QueueConfig,
    state: Mutex<State<T, E>>,
}

/// How a single attempt ended.
enum Attempt<T, E> {
    Done(Result<T, E>),
    TimedOut,
    Panicked,
}

/// Bounded async task queue.
///
/// Cheap to clone; clones share the same queue.
pub struct TaskQueue<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for TaskQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> TaskQueue<T, E>
where
    T: Clone + Send + 'static,
    E: Retryable + Clone + std::fmt::Display + Send + 'static,
{
    pub fn new(mut config: QueueConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    pending: BTreeMap::new(),
                    by_key: HashMap::new(),
                    next_seq: 0,
                    in_flight: 0,
                    pump_scheduled: false,
                    closed: false,
                    counters: QueueMetrics::default(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Current counters.
    pub fn metrics(&self) -> QueueMetrics {
        self.inner.state.lock().snapshot()
    }

    /// Enqueue a task.
    ///
    /// Supersession and overflow are applied immediately; execution starts
    /// once the spawned pump runs. Must be called within a Tokio runtime.
    pub fn push(&self, spec: TaskSpec<T, E>) -> TaskHandle<T, E> {
        let config = &self.inner.config;
        let (tx, rx) = oneshot::channel();
        let mut rejected: Vec<(Pending<T, E>, QueueError<E>)> = Vec::new();
        let spawn_pump;
        let snapshot;

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return TaskHandle::ready(Err(QueueError::Closed));
            }

            if let Some(key) = spec.key.as_deref() {
                if let Some(&seq) = state.by_key.get(key) {
                    let existing_priority = state.pending.get(&seq).map(|t| t.priority);
                    let coalesce = config.discipline == Discipline::Priority
                        && existing_priority.is_some_and(|p| spec.priority <= p);

                    if coalesce {
                        if let Some(existing) = state.pending.get_mut(&seq) {
                            existing.waiters.push(tx);
                        }
                        state.counters.coalesced += 1;
                        debug!(queue = %config.name, key, "Joined pending task with same key");
                        return TaskHandle::new(rx);
                    }

                    if let Some(old) = state.remove(seq) {
                        state.counters.superseded += 1;
                        rejected.push((
                            old,
                            QueueError::Superseded {
                                key: key.to_string(),
                            },
                        ));
                    }
                }
            }

            if config.max_size > 0 && state.pending.len() >= config.max_size {
                if let Some(old) = state
                    .next_to_evict(config.discipline)
                    .and_then(|seq| state.remove(seq))
                {
                    state.counters.dropped += 1;
                    warn!(
                        queue = %config.name,
                        evicted_key = old.key.as_deref().unwrap_or("-"),
                        evicted_priority = old.priority,
                        max_size = config.max_size,
                        "Queue full, evicting pending task"
                    );
                    let key = old.key.clone();
                    rejected.push((old, QueueError::Overflow { key }));
                }
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            if let Some(key) = &spec.key {
                state.by_key.insert(key.clone(), seq);
            }
            state.pending.insert(
                seq,
                Pending {
                    key: spec.key,
                    priority: spec.priority,
                    enqueued_at: Instant::now(),
                    max_retries: spec.max_retries.unwrap_or(config.default_max_retries),
                    base_delay: spec.base_delay.unwrap_or(config.default_base_delay),
                    job: spec.job,
                    waiters: vec![tx],
                },
            );

            spawn_pump = !state.pump_scheduled;
            state.pump_scheduled = true;
            snapshot = state.snapshot();
        }

        for (old, err) in rejected {
            Metrics::queue_task(&config.name, err.outcome_label());
            if let QueueError::Superseded { key } = &err {
                debug!(queue = %config.name, key = %key, "Superseded pending task");
            }
            old.resolve(Err(err));
        }
        Metrics::queue_depth(&config.name, snapshot.pending, snapshot.in_flight);

        if spawn_pump {
            let queue = self.clone();
            tokio::spawn(async move { queue.dispatch() });
        }
        TaskHandle::new(rx)
    }

    /// Reject every pending task with [`QueueError::Closed`] and refuse new
    /// pushes. In-flight tasks run to completion.
    pub fn close(&self) {
        let drained: Vec<Pending<T, E>> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.by_key.clear();
            std::mem::take(&mut state.pending).into_values().collect()
        };
        for task in drained {
            task.resolve(Err(QueueError::Closed));
        }
    }

    /// Start pending tasks while slots are free.
    fn dispatch(&self) {
        let config = &self.inner.config;
        let mut started = Vec::new();
        let snapshot;
        {
            let mut state = self.inner.state.lock();
            state.pump_scheduled = false;
            while state.in_flight < config.concurrency {
                let Some(task) = state
                    .next_to_run(config.discipline)
                    .and_then(|seq| state.remove(seq))
                else {
                    break;
                };
                state.in_flight += 1;
                started.push(task);
            }
            snapshot = state.snapshot();
        }
        if started.is_empty() {
            return;
        }
        Metrics::queue_depth(&config.name, snapshot.pending, snapshot.in_flight);

        for task in started {
            let queue = self.clone();
            tokio::spawn(async move { queue.run(task).await });
        }
    }

    async fn run(self, task: Pending<T, E>) {
        let config = &self.inner.config;
        let key = task.key.as_deref().unwrap_or("-");
        let mut attempt: u32 = 0;

        let result = loop {
            attempt += 1;
            let retry_reason = match self.attempt(&task.job).await {
                Attempt::Done(Ok(value)) => break Ok(value),
                Attempt::Done(Err(err)) => {
                    if !err.is_retryable() {
                        debug!(queue = %config.name, key, attempt, error = %err, "Non-retryable task error");
                        break Err(QueueError::Failed {
                            attempts: attempt,
                            error: err,
                        });
                    }
                    if attempt > task.max_retries {
                        break Err(QueueError::Failed {
                            attempts: attempt,
                            error: err,
                        });
                    }
                    err.to_string()
                }
                Attempt::TimedOut => {
                    self.inner.state.lock().counters.timed_out += 1;
                    Metrics::queue_task(&config.name, "timed_out");
                    if attempt > task.max_retries {
                        break Err(QueueError::Timeout { attempts: attempt });
                    }
                    "timeout".to_string()
                }
                Attempt::Panicked => break Err(QueueError::Panicked { attempts: attempt }),
            };

            let delay = config.backoff.delay(task.base_delay, attempt);
            warn!(
                queue = %config.name,
                key,
                attempt,
                max_retries = task.max_retries,
                delay_ms = delay.as_millis() as u64,
                reason = %retry_reason,
                "Task attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        let snapshot = {
            let mut state = self.inner.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            match &result {
                Ok(_) => state.counters.processed += 1,
                Err(_) => state.counters.failed += 1,
            }
            state.snapshot()
        };
        match &result {
            Ok(_) => Metrics::queue_task(&config.name, "processed"),
            Err(QueueError::Timeout { .. }) => Metrics::queue_task(&config.name, "failed"),
            Err(err) => {
                warn!(queue = %config.name, key, error = %err, "Task failed");
                Metrics::queue_task(&config.name, err.outcome_label());
            }
        }
        Metrics::queue_depth(&config.name, snapshot.pending, snapshot.in_flight);

        resolve_all(task.waiters, result);
        self.dispatch();
    }

    /// Run one attempt on its own task so a timeout only ends our wait.
    async fn attempt(&self, job: &Job<T, E>) -> Attempt<T, E> {
        let handle = tokio::spawn(job());
        let joined = match self.inner.config.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => return Attempt::TimedOut,
            },
            None => handle.await,
        };
        match joined {
            Ok(result) => Attempt::Done(result),
            Err(_) => Attempt::Panicked,
        }
    }
}
