//! Request metrics middleware
//!
//! Records count and latency for every routed request, labelled with the
//! matched route template so ids never become label values.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use pressroom_common::metrics::RequestMetrics;

/// Label used when no route matched
const UNMATCHED: &str = "unmatched";

pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let metrics = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    metrics.finish(response.status().as_u16());
    response
}
