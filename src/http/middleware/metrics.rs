//! Request count and latency recording.
//!
//! Labelled by the matched route template (`/api/{*path}`) rather than the
//! raw path to keep label cardinality bounded.

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

use crate::observability::metrics;

const UNMATCHED: &str = "unmatched";

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED, MatchedPath::as_str)
        .to_string();

    let response = next.run(request).await;

    metrics::record_request(&method, &route, response.status().as_u16(), started);
    response
}
