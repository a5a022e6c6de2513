//! Prometheus metrics and structured logging for ocbot.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics for queues, the order coordinator and reconciliation
//! - `LogThrottle`: per-key rate limiting for high-frequency warnings

pub mod error;
pub mod logging;
pub mod metrics;
pub mod throttle;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, init_logging_with, DEFAULT_FILTER};
pub use metrics::Metrics;
pub use throttle::LogThrottle;
