//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define runtime metrics (requests, latency, locator cache)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `runtime_requests_total` (counter): requests by method, status
//! - `runtime_request_duration_seconds` (histogram): latency distribution
//! - `runtime_locator_cache_total` (counter): locator cache hits and misses
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - Labels are low cardinality: never the request path

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "runtime_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("runtime_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a locator cache lookup; `result` is `hit` or `miss`.
pub fn record_locator_cache(result: &'static str) {
    ::metrics::counter!("runtime_locator_cache_total", "result" => result).increment(1);
}
