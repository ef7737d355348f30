//! Prometheus metrics for whatsapp-bot-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};
use std::sync::{Once, OnceLock};

/// Handle of the `metrics` recorder used by the HTTP middleware.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static RECORDER: Once = Once::new();

/// Turns by the state they started in and how they ended.
pub static TURNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bot_turns_total",
        "Total number of conversation turns",
        &["state", "outcome"] // outcome: ok, error
    )
    .expect("Failed to register bot_turns_total")
});

/// Orders placed (no restaurant label to keep cardinality bounded).
pub static ORDERS_PLACED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("bot_orders_placed_total", "Total number of orders placed")
        .expect("Failed to register bot_orders_placed_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "bot_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register bot_errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "bot_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register bot_db_query_duration_seconds")
});

/// Forces the lazy statics and installs the HTTP metrics recorder once per
/// process. Safe to call repeatedly.
pub fn init_metrics() {
    Lazy::force(&TURNS_TOTAL);
    Lazy::force(&ORDERS_PLACED);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);

    RECORDER.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Metrics recorder not installed"),
    });
}

/// Both registries in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}

pub fn record_turn(state: &str, outcome: &str) {
    TURNS_TOTAL.with_label_values(&[state, outcome]).inc();
}

pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
