//! Metrics collection and exposition.
//!
//! # Metrics
//! - `echo_requests_total` (counter): requests echoed, by method
//! - `echo_request_body_bytes` (histogram): buffered body sizes
//! - `echo_extraction_failures_total` (counter): swallowed failures, by stage
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one echoed request.
pub fn record_request(method: &str, body_len: usize) {
    metrics::counter!("echo_requests_total", "method" => method.to_string()).increment(1);
    metrics::histogram!("echo_request_body_bytes").record(body_len as f64);
}

/// Record a failure that was turned into an absent field.
pub fn record_extraction_failure(stage: &'static str) {
    metrics::counter!("echo_extraction_failures_total", "stage" => stage).increment(1);
}
