//! Prometheus metrics for donation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

/// Histogram for database operation duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "donation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for dispatched donation events.
pub static DONATION_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "donation_events_total",
        "Total number of donation events dispatched to listeners",
        &["event"]
    )
    .expect("Failed to register DONATION_EVENTS")
});

/// Counter for gateway commands produced from payment-intent states.
pub static GATEWAY_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "donation_gateway_commands_total",
        "Total number of gateway commands by gateway and outcome",
        &["gateway", "command"]
    )
    .expect("Failed to register GATEWAY_COMMANDS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&DONATION_EVENTS);
    Lazy::force(&GATEWAY_COMMANDS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_donation_event(event: &str) {
    DONATION_EVENTS.with_label_values(&[event]).inc();
}

pub fn record_gateway_command(gateway: &str, command: &str) {
    GATEWAY_COMMANDS.with_label_values(&[gateway, command]).inc();
}
