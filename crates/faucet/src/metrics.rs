//! Prometheus counters for claim outcomes.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "faucet_requests_total",
        "Claim requests by outcome",
        &["outcome"]
    )
    .expect("metric registration")
});

static GRANTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("faucet_grants_total", "Successfully disbursed claims")
        .expect("metric registration")
});

pub fn record_outcome(outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_grant() {
    GRANTS_TOTAL.inc();
}

/// Encode the default registry in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Metrics encoding failed: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
