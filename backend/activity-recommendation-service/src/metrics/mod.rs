//! Recommendation Metrics
//!
//! Prometheus metrics for the recommendation pipeline and its HTTP surface

use actix_web::{get, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "activity_recommendation_requests_total",
        "Recommendation requests by endpoint and outcome",
        &["endpoint", "status"]
    )
    .expect("Failed to register recommendation requests metric")
});

static STAGE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "activity_recommendation_stage_duration_seconds",
        "Cumulative pipeline time at the end of each stage",
        &["stage"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register recommendation stage duration metric")
});

static SKIPPED_CANDIDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "activity_recommendation_skipped_candidates_total",
        "Candidates dropped because a layer produced an invalid score",
        &["layer"]
    )
    .expect("Failed to register skipped candidates metric")
});

static RETURNED_ITEMS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "activity_recommendation_returned_items",
        "Number of activities returned per request",
        vec![0.0, 1.0, 3.0, 5.0, 10.0, 20.0]
    )
    .expect("Failed to register returned items metric")
});

static VIEW_LOG_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "activity_recommendation_view_log_failures_total",
        "Failed attempts to record recommendation views"
    )
    .expect("Failed to register view log failures metric")
});

/// Record request outcome (success/empty/error)
pub fn record_request(endpoint: &str, status: &str) {
    REQUESTS_TOTAL.with_label_values(&[endpoint, status]).inc();
}

pub fn observe_stage(stage: &str, elapsed: Duration) {
    STAGE_DURATION_SECONDS
        .with_label_values(&[stage])
        .observe(elapsed.as_secs_f64());
}

pub fn record_skipped_candidate(layer: &str) {
    SKIPPED_CANDIDATES_TOTAL.with_label_values(&[layer]).inc();
}

#[cfg(test)]
pub(crate) fn skipped_candidate_count(layer: &str) -> u64 {
    SKIPPED_CANDIDATES_TOTAL.with_label_values(&[layer]).get()
}

pub fn record_returned(count: usize) {
    RETURNED_ITEMS.observe(count as f64);
}

pub fn record_view_log_failure() {
    VIEW_LOG_FAILURES_TOTAL.inc();
}

/// Prometheus text exposition of the default registry
#[get("/metrics")]
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_counter_increments() {
        let before = SKIPPED_CANDIDATES_TOTAL
            .with_label_values(&["test_layer"])
            .get();
        record_skipped_candidate("test_layer");
        assert_eq!(
            SKIPPED_CANDIDATES_TOTAL
                .with_label_values(&["test_layer"])
                .get(),
            before + 1
        );
    }
}
