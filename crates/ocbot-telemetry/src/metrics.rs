//! Prometheus metrics for ocbot.
//!
//! Covers:
//! - Task queues (pending, in-flight, outcomes)
//! - Global order coordinator ceiling
//! - Reconciliation cycles and corrective actions
//! - Exchange collaborator errors and snapshot cache effectiveness
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error and must surface at
//! first use rather than silently dropping the metric.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, Histogram, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

use crate::error::TelemetryResult;

// =============================================================================
// Queues
// =============================================================================

/// Pending tasks per queue.
/// Labels: queue (`orders:{bot_id}` or `background`)
pub static QUEUE_PENDING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("ocbot_queue_pending", "Pending tasks per queue", &["queue"]).unwrap()
});

/// Executing tasks per queue.
pub static QUEUE_IN_FLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "ocbot_queue_in_flight",
        "Executing tasks per queue",
        &["queue"]
    )
    .unwrap()
});

/// Task outcomes.
/// Labels: queue, outcome (processed/dropped/timed_out/failed/superseded)
pub static QUEUE_TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_queue_tasks_total",
        "Task outcomes per queue",
        &["queue", "outcome"]
    )
    .unwrap()
});

/// Order tasks holding a global coordinator slot.
pub static GLOBAL_ORDERS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ocbot_global_orders_in_flight",
        "Order tasks holding a global concurrency slot"
    )
    .unwrap()
});

// =============================================================================
// Orders
// =============================================================================

/// Exit orders placed.
/// Labels: kind (take_profit/stop_loss/market_close)
pub static ORDERS_PLACED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_orders_placed_total",
        "Exit orders placed on the exchange",
        &["kind"]
    )
    .unwrap()
});

/// Exit orders cancelled.
/// Labels: reason (replaced/duplicate)
pub static ORDERS_CANCELLED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_orders_cancelled_total",
        "Exit orders cancelled on the exchange",
        &["reason"]
    )
    .unwrap()
});

/// Exchange position snapshot lookups.
/// Labels: result (hit/miss/fallback)
pub static SNAPSHOT_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_snapshot_cache_total",
        "Exchange position snapshot cache lookups",
        &["result"]
    )
    .unwrap()
});

// =============================================================================
// Reconciliation
// =============================================================================

/// Per-bot reconcile passes.
/// Labels: outcome (ok/failed/skipped)
pub static RECONCILE_CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_reconcile_cycles_total",
        "Per-bot reconciliation passes",
        &["outcome"]
    )
    .unwrap()
});

/// Corrective actions taken by the reconciler.
/// Labels: action (materialized/closed_zero_size/closed_missing/promoted/exit_cancelled/exit_repair)
pub static RECONCILE_ACTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_reconcile_actions_total",
        "Corrective actions taken by the reconciler",
        &["action"]
    )
    .unwrap()
});

/// Full reconciliation pass duration in milliseconds.
pub static RECONCILE_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "ocbot_reconcile_duration_ms",
        "Full reconciliation pass duration in milliseconds",
        vec![5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Exchange collaborator errors.
/// Labels: operation, kind
pub static EXCHANGE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ocbot_exchange_errors_total",
        "Errors returned by the exchange collaborator",
        &["operation", "kind"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    // =========================================================================
    // Queues
    // =========================================================================

    /// Set pending and in-flight gauges for a queue.
    pub fn queue_depth(queue: &str, pending: usize, in_flight: usize) {
        QUEUE_PENDING
            .with_label_values(&[queue])
            .set(pending as i64);
        QUEUE_IN_FLIGHT
            .with_label_values(&[queue])
            .set(in_flight as i64);
    }

    /// Record a task outcome.
    pub fn queue_task(queue: &str, outcome: &str) {
        QUEUE_TASKS_TOTAL
            .with_label_values(&[queue, outcome])
            .inc();
    }

    pub fn global_in_flight_set(count: usize) {
        GLOBAL_ORDERS_IN_FLIGHT.set(count as i64);
    }

    // =========================================================================
    // Orders
    // =========================================================================

    pub fn order_placed(kind: &str) {
        ORDERS_PLACED_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn order_cancelled(reason: &str) {
        ORDERS_CANCELLED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn snapshot_cache(result: &str) {
        SNAPSHOT_CACHE_TOTAL.with_label_values(&[result]).inc();
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    pub fn reconcile_cycle(outcome: &str) {
        RECONCILE_CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn reconcile_action(action: &str) {
        RECONCILE_ACTIONS_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn reconcile_duration(duration_ms: f64) {
        RECONCILE_DURATION_MS.observe(duration_ms);
    }

    pub fn exchange_error(operation: &str, kind: &str) {
        EXCHANGE_ERRORS_TOTAL
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode_text() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
