//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the mediaflow server:
//! - HTTP request metrics (latency, counts)
//! - Job admission metrics (submissions, rejections)
//! - Queue occupancy and job outcomes (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds, up to the response head.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mediaflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "mediaflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs admitted into a queue.
pub static JOBS_SUBMITTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mediaflow_jobs_submitted_total", "Jobs admitted into a queue"),
        &["kind"],
    )
    .unwrap()
});

/// Jobs turned away because the queue was full.
pub static JOBS_REJECTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mediaflow_jobs_rejected_total",
            "Jobs rejected because the queue was full",
        ),
        &["kind"],
    )
    .unwrap()
});

/// Jobs currently held by a queue, by state (queued, running).
pub static QUEUE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("mediaflow_queue_jobs", "Jobs currently held by a queue"),
        &["kind", "state"],
    )
    .unwrap()
});

/// Finished jobs by outcome (completed, failed, cancelled).
pub static JOBS_FINISHED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("mediaflow_jobs_finished", "Finished jobs by outcome"),
        &["kind", "outcome"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Jobs
    registry
        .register(Box::new(JOBS_SUBMITTED_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(JOBS_REJECTED_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(QUEUE_JOBS.clone())).unwrap();
    registry.register(Box::new(JOBS_FINISHED.clone())).unwrap();
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so queue gauges reflect the current membership.
pub fn collect_dynamic_metrics(state: &AppState) {
    for (kind, queue) in state.queues() {
        let stats = queue.stats();
        let kind = kind.as_str();
        QUEUE_JOBS
            .with_label_values(&[kind, "queued"])
            .set(stats.queued as i64);
        QUEUE_JOBS
            .with_label_values(&[kind, "running"])
            .set(stats.running as i64);
        JOBS_FINISHED
            .with_label_values(&[kind, "completed"])
            .set(stats.completed as i64);
        JOBS_FINISHED
            .with_label_values(&[kind, "failed"])
            .set(stats.failed as i64);
        JOBS_FINISHED
            .with_label_values(&[kind, "cancelled"])
            .set(stats.cancelled as i64);
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Replace UUIDs with placeholders
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
