//! Metrics and observability utilities
//!
//! Prometheus metrics for the edition lifecycle with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Pressroom metrics
pub const METRICS_PREFIX: &str = "pressroom";

/// Histogram buckets for request latency (in seconds).
/// Uploads stream whole PDFs to disk, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_editions_created_total", METRICS_PREFIX),
        Unit::Count,
        "Editions created"
    );

    describe_counter!(
        format!("{}_editions_updated_total", METRICS_PREFIX),
        Unit::Count,
        "Editions updated"
    );

    describe_counter!(
        format!("{}_editions_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Editions deleted"
    );

    describe_counter!(
        format!("{}_pages_stored_total", METRICS_PREFIX),
        Unit::Count,
        "Page images attached to editions"
    );

    describe_counter!(
        format!("{}_files_removed_total", METRICS_PREFIX),
        Unit::Count,
        "Storage file removals by outcome"
    );

    describe_counter!(
        format!("{}_cleanup_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retried background file removals"
    );

    describe_counter!(
        format!("{}_update_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Updates rejected because the edition changed underneath them"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Lifecycle events worth counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditionEvent {
    Created,
    Updated,
    Deleted,
}

/// Helper to record lifecycle metrics
pub fn record_edition(event: EditionEvent, pages_added: usize) {
    let name = match event {
        EditionEvent::Created => "editions_created_total",
        EditionEvent::Updated => "editions_updated_total",
        EditionEvent::Deleted => "editions_deleted_total",
    };
    counter!(format!("{}_{}", METRICS_PREFIX, name)).increment(1);

    if pages_added > 0 {
        counter!(format!("{}_pages_stored_total", METRICS_PREFIX)).increment(pages_added as u64);
    }
}

pub fn record_file_removal(outcome: &'static str) {
    counter!(
        format!("{}_files_removed_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_cleanup_retry() {
    counter!(format!("{}_cleanup_retries_total", METRICS_PREFIX)).increment(1);
}

pub fn record_conflict() {
    counter!(format!("{}_update_conflicts_total", METRICS_PREFIX)).increment(1);
}
