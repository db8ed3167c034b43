//! # Global Metrics Registry
//!
//! Prometheus metrics for the scoring service, registered once in the default
//! registry. `gather()` renders the text exposition format.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use tracing::error;

/// Score requests by outcome: `invalid`, `inactive`, `cached`, `scanned`, `failed`.
pub static SCORE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "score_requests_total",
        "Number of score requests handled, by outcome.",
        &["outcome"]
    )
    .expect("Failed to register score_requests_total")
});

pub static CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "score_cache_hits_total",
        "Number of requests answered from a fresh cached record."
    )
    .expect("Failed to register score_cache_hits_total")
});

pub static CACHE_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "score_cache_write_failures_total",
        "Number of cache writes that failed and were skipped."
    )
    .expect("Failed to register score_cache_write_failures_total")
});

pub static UPSTREAM_FETCH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "upstream_fetch_failures_total",
        "Number of failed upstream fetches, by data source.",
        &["source"]
    )
    .expect("Failed to register upstream_fetch_failures_total")
});

pub static UPSTREAM_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "upstream_retries_total",
        "Number of upstream calls retried after a rate-limit reply.",
        &["service"]
    )
    .expect("Failed to register upstream_retries_total")
});

pub static UPSTREAM_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "upstream_latency_seconds",
        "Latency of successful upstream calls, including limiter waits.",
        &["service"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register upstream_latency_seconds")
});

pub static TRANSACTIONS_SCANNED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "transactions_scanned_total",
        "Number of merged transaction records walked by the scan engine."
    )
    .expect("Failed to register transactions_scanned_total")
});

pub static SCAN_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "scan_duration_seconds",
        "Wall time of a single-pass scan.",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to register scan_duration_seconds")
});

/// Renders every registered metric in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        SCORE_REQUESTS.with_label_values(&["invalid"]).inc();
        CACHE_HITS.inc();
        let text = gather();
        assert!(text.contains("score_requests_total"));
        assert!(text.contains("score_cache_hits_total"));
    }
}
