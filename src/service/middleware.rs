//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! - `request` - Request count and latency by path pattern, method, status
//! - `query` - Result size and latency per membership query

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Header carrying the request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing events; aggregate from logs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "membership_graph::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Request logging middleware that adds a correlation ID and timing.
///
/// Reuses an inbound `x-request-id` when present and echoes the ID on
/// the response.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    span.record("status", status);
    span.record("latency_ms", latency.as_millis() as u64);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        target: "membership_graph::access",
        request_id = %request_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request completed"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces user and group identifiers with a placeholder.
pub fn normalize_path(path: &str) -> String {
    static IDENTIFIER: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = IDENTIFIER.get_or_init(|| {
        regex_lite::Regex::new(r"^/(users|groups)/[^/]+").expect("identifier pattern is valid")
    });

    re.replace(path, "/$1/:name").to_string()
}

/// Record membership query metrics.
///
/// Call this after answering a query to track result sizes.
pub fn record_query_metrics(operation: &str, result_count: usize, latency_ms: u64) {
    info!(
        target: "membership_graph::metrics",
        metric_type = "query",
        operation = operation,
        result_count = result_count,
        latency_ms = latency_ms,
        "query_metric"
    );
}
