// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use skein_core::Operation;

use crate::backpressure::BackpressureLevel;

/// Register all Skein metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("skein_events_submitted_total", "Events accepted into the queue");
    describe_counter!(
        "skein_events_dropped_total",
        "Events discarded by overflow or backpressure policy"
    );
    describe_counter!("skein_events_rejected_total", "Submissions refused with an error");
    describe_gauge!("skein_queue_depth", "Events waiting in the queue");
    describe_gauge!(
        "skein_backpressure_level",
        "Backpressure level (0=normal, 1=elevated, 2=high, 3=critical)"
    );
    describe_counter!("skein_batches_total", "Batches by final delivery outcome");
    describe_counter!("skein_events_delivered_total", "Events by per-event delivery outcome");
    describe_counter!("skein_delivery_attempts_total", "Transport attempts by outcome");
    describe_histogram!(
        "skein_delivery_latency_seconds",
        "Time from first attempt to final outcome of a batch"
    );
    describe_gauge!(
        "skein_circuit_state",
        "Circuit breaker state (0=closed, 1=open, 2=half_open)"
    );
    describe_counter!("skein_circuit_transitions_total", "Circuit breaker state transitions");
    describe_counter!(
        "skein_circuit_rejections_total",
        "Calls rejected by an open circuit breaker"
    );
    describe_counter!("skein_hook_failures_total", "Hook failures including panics");
    describe_counter!("skein_async_errors_total", "Background failures reported");
    describe_counter!(
        "skein_async_errors_dropped_total",
        "Background failures dropped because the error buffer was full"
    );
}

/// Record an accepted submission.
pub fn record_event_submitted() {
    metrics::counter!("skein_events_submitted_total").increment(1);
}

/// Record an event discarded without delivery.
pub fn record_event_dropped(reason: &'static str) {
    metrics::counter!("skein_events_dropped_total", "reason" => reason).increment(1);
}

/// Record a submission refused with an error.
pub fn record_event_rejected(kind: &str) {
    metrics::counter!("skein_events_rejected_total", "kind" => kind.to_string()).increment(1);
}

/// Set the current queue depth.
pub fn set_queue_depth(depth: usize) {
    metrics::gauge!("skein_queue_depth").set(depth as f64);
}

/// Set the current backpressure level.
pub fn set_backpressure_level(level: BackpressureLevel) {
    metrics::gauge!("skein_backpressure_level").set(level as u8 as f64);
}

/// Record the final outcome of a batch and its per-event counts.
pub fn record_batch(outcome: &'static str, succeeded: usize, failed: usize) {
    metrics::counter!("skein_batches_total", "outcome" => outcome).increment(1);
    metrics::counter!("skein_events_delivered_total", "outcome" => "success")
        .increment(succeeded as u64);
    metrics::counter!("skein_events_delivered_total", "outcome" => "failure")
        .increment(failed as u64);
}

/// Record a single transport attempt.
pub fn record_delivery_attempt(outcome: &'static str) {
    metrics::counter!("skein_delivery_attempts_total", "outcome" => outcome).increment(1);
}

/// Record batch delivery latency.
pub fn record_delivery_latency(seconds: f64) {
    metrics::histogram!("skein_delivery_latency_seconds").record(seconds);
}

/// Record a reported background failure.
pub fn record_async_error(operation: Operation) {
    metrics::counter!("skein_async_errors_total", "operation" => operation.to_string())
        .increment(1);
}

/// Record a background failure dropped on a full buffer.
pub fn record_async_error_dropped() {
    metrics::counter!("skein_async_errors_dropped_total").increment(1);
}
