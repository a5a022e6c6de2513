//! Retry classification.

/// Errors that can tell a task queue whether another attempt may succeed.
///
/// Transient failures (network, rate limit, timeout) return `true`.
/// Failures that will repeat on every attempt (position already closed,
/// reduce-only rejected) return `false` and fail the task immediately.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}
