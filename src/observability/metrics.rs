//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy and session metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `edge_proxy_requests_total` (counter): relayed requests by method, status
//! - `edge_proxy_request_duration_seconds` (histogram): latency by method
//! - `edge_proxy_upstream_errors_total` (counter): transport failures
//! - `edge_session_refresh_total` (counter): refresh calls by outcome
//! - `edge_session_transitions_total` (counter): session state changes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op (tests, CLI)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one relayed request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    counter!(
        "edge_proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("edge_proxy_request_duration_seconds", "method" => method.to_string())
        .record(start_time.elapsed().as_secs_f64());
}

/// Record a forwarder transport failure.
pub fn record_upstream_error() {
    counter!("edge_proxy_upstream_errors_total").increment(1);
}

/// Record a refresh call outcome ("success", "rejected", "network", "discarded").
pub fn record_refresh(outcome: &'static str) {
    counter!("edge_session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a session state transition.
pub fn record_transition(to: &'static str) {
    counter!("edge_session_transitions_total", "to" => to).increment(1);
}
