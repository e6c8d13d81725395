//! Prometheus metrics for pep-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pep_db_query_duration_seconds",
        "Database query duration in seconds",
        &["query"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Sign/verify operations by outcome (hit, miss, error).
pub static SIGNER_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pep_signer_operations_total",
        "Signer operations by cache outcome",
        &["operation", "outcome"]
    )
    .expect("Failed to register signer_operations")
});

/// Per-service filter decisions.
pub static FILTER_DECISIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pep_filter_decisions_total",
        "Service compatibility decisions",
        &["decision"] // allowed, denied
    )
    .expect("Failed to register filter_decisions")
});

/// Registry calls by operation and outcome.
pub static REGISTRY_CALLS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pep_registry_calls_total",
        "Outbound identity-registry calls",
        &["operation", "outcome"] // ok, rejected, unreachable
    )
    .expect("Failed to register registry_calls")
});

/// Render the default registry in the Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
