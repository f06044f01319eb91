//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency by method, route
//! - `gateway_token_refresh_total` (counter): refresh attempts by outcome
//! - `gateway_csrf_checks_total` (counter): CSRF pre-checks by outcome
//! - `gateway_upstream_errors_total` (counter): failed backend calls
//!
//! # Design Decisions
//! - Recording functions are no-ops until a recorder is installed, so tests
//!   and library users never need an exporter
//! - The Prometheus exporter serves its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub mod names {
    pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
    pub const TOKEN_REFRESH_TOTAL: &str = "gateway_token_refresh_total";
    pub const CSRF_CHECKS_TOTAL: &str = "gateway_csrf_checks_total";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "gateway_upstream_errors_total";
}

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, route: &str, status: u16, started: Instant) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_token_refresh(outcome: &'static str) {
    counter!(names::TOKEN_REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_csrf_check(outcome: &'static str) {
    counter!(names::CSRF_CHECKS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_upstream_error() {
    counter!(names::UPSTREAM_ERRORS_TOTAL).increment(1);
}
