//! Prometheus metrics for the aggregation engine.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

/// Lookups received, by detected indicator kind.
pub static INTEL_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("argus_intel_lookups_total", "Total intelligence lookups"),
        &["indicator"],
    )
    .unwrap()
});

/// Per-service lookup outcomes.
pub static SERVICE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "argus_service_lookups_total",
            "Total upstream service lookups",
        ),
        &["service", "outcome"], // "ok", "api_key_missing", "rate_limited", "not_found", "api_error"
    )
    .unwrap()
});

/// End-to-end aggregation duration, bounded below by the slowest service.
pub static LOOKUP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "argus_intel_lookup_duration_seconds",
            "Duration of a full aggregation",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["indicator"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(INTEL_LOOKUPS.clone()),
        Box::new(SERVICE_LOOKUPS.clone()),
        Box::new(LOOKUP_DURATION.clone()),
    ]
}
