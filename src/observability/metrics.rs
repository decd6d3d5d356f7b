//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_prepare_total` (counter): prepare calls by chain, outcome
//! - `relay_confirm_total` (counter): confirm calls by chain, outcome
//! - `relay_broadcast_attempts_total` (counter): submissions by chain, path, verdict
//! - `relay_broadcast_duration_seconds` (histogram): submission latency by chain, path
//! - `relay_disguised_success_total` (counter): non-2xx answers that were acceptances
//! - `relay_fallback_total` (counter): switches to the secondary broadcast path
//! - `relay_expired_total` (counter): prepared transactions that hit their ttl
//! - `relay_store_records` (gauge): records held by the store
//! - `relay_nonce_reservations` (gauge): outstanding nonces per chain
//! - `relay_gas_price_wei` (gauge): last gas price snapshot per chain

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_prepare(chain: &str, outcome: &str) {
    counter!("relay_prepare_total", "chain" => chain.to_string(), "outcome" => outcome.to_string()).increment(1);
}

pub fn record_confirm(chain: &str, outcome: &str) {
    counter!("relay_confirm_total", "chain" => chain.to_string(), "outcome" => outcome.to_string()).increment(1);
}

pub fn record_broadcast_attempt(chain: &str, path: &str, verdict: &str, elapsed: Duration) {
    counter!(
        "relay_broadcast_attempts_total",
        "chain" => chain.to_string(),
        "path" => path.to_string(),
        "verdict" => verdict.to_string()
    )
    .increment(1);
    histogram!(
        "relay_broadcast_duration_seconds",
        "chain" => chain.to_string(),
        "path" => path.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_disguised_success(chain: &str, path: &str) {
    counter!("relay_disguised_success_total", "chain" => chain.to_string(), "path" => path.to_string()).increment(1);
}

pub fn record_fallback(chain: &str) {
    counter!("relay_fallback_total", "chain" => chain.to_string()).increment(1);
}

pub fn record_expired(chain: &str, count: u64) {
    counter!("relay_expired_total", "chain" => chain.to_string()).increment(count);
}

pub fn record_store_size(records: usize) {
    gauge!("relay_store_records").set(records as f64);
}

pub fn record_nonce_reservations(chain: &str, outstanding: usize) {
    gauge!("relay_nonce_reservations", "chain" => chain.to_string()).set(outstanding as f64);
}

pub fn record_gas_price(chain: &str, wei: u128) {
    gauge!("relay_gas_price_wei", "chain" => chain.to_string()).set(wei as f64);
}
