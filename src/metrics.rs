// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Active server resolution
//! - Relay connection lifecycle
//! - Batch pull / ack / rollback
//! - Consumer loop progress
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `canal_` and labelled with `destination`:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use canal_cluster_client::metrics;
//! use std::time::Duration;
//!
//! metrics::record_resolution("example", true);
//! metrics::record_get("example", 42, Duration::from_millis(12));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record an active-server resolution attempt.
pub fn record_resolution(destination: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("canal_resolutions_total", "destination" => destination.to_string(), "status" => status).increment(1);
}

/// Record a connect attempt against a resolved server.
pub fn record_connection(destination: &str, address: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "canal_connections_total",
        "destination" => destination.to_string(),
        "address" => address.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Numeric encoding of a connector state for alerting.
pub fn connector_state_value(state: &str) -> f64 {
    match state {
        "disconnected" => 0.0,
        "connecting" => 1.0,
        "connected" => 2.0,
        "subscribed" => 3.0,
        _ => -1.0,
    }
}

/// Record connector state (0=disconnected .. 3=subscribed).
///
/// One series per destination, so a transition overwrites the previous state.
pub fn record_connector_state(destination: &str, state: &str) {
    gauge!("canal_connector_state", "destination" => destination.to_string())
        .set(connector_state_value(state));
}

/// Record a session dropped because of a transport failure.
pub fn record_session_lost(destination: &str, operation: &str) {
    counter!(
        "canal_sessions_lost_total",
        "destination" => destination.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record one `get()` call: entries received and long-poll duration.
pub fn record_get(destination: &str, entries: usize, duration: Duration) {
    if entries == 0 {
        counter!("canal_empty_polls_total", "destination" => destination.to_string()).increment(1);
    } else {
        counter!("canal_entries_received_total", "destination" => destination.to_string()).increment(entries as u64);
        histogram!("canal_batch_size", "destination" => destination.to_string()).record(entries as f64);
    }
    histogram!("canal_get_duration_seconds", "destination" => destination.to_string())
        .record(duration.as_secs_f64());
}

/// Record an acknowledged batch.
pub fn record_ack(destination: &str) {
    counter!("canal_batches_acked_total", "destination" => destination.to_string()).increment(1);
}

/// Record a rolled-back batch.
pub fn record_rollback(destination: &str) {
    counter!("canal_batches_rolled_back_total", "destination" => destination.to_string()).increment(1);
}

/// Record a consumer-loop reconnect attempt.
pub fn record_reconnect_attempt(destination: &str, attempt: usize) {
    counter!("canal_reconnect_attempts_total", "destination" => destination.to_string()).increment(1);
    gauge!("canal_reconnect_consecutive_failures", "destination" => destination.to_string()).set(attempt as f64);
}

/// Reset the consecutive failure gauge after a successful reconnect.
pub fn reset_reconnect_failures(destination: &str) {
    gauge!("canal_reconnect_consecutive_failures", "destination" => destination.to_string()).set(0.0);
}

/// Record handler processing latency for one batch.
pub fn record_handler_latency(destination: &str, duration: Duration) {
    histogram!("canal_handler_duration_seconds", "destination" => destination.to_string())
        .record(duration.as_secs_f64());
}

/// Record an error by type.
pub fn record_error(destination: &str, error_type: &str) {
    counter!(
        "canal_errors_total",
        "destination" => destination.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}
