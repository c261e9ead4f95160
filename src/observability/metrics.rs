//! Metrics collection and exposition.
//!
//! # Metrics
//! - `apiwire_requests_total` (counter): dispatched calls by method, outcome
//! - `apiwire_request_duration_seconds` (histogram): end-to-end call latency
//! - `apiwire_cache_lookups_total` (counter): lookups by result
//! - `apiwire_cache_entries` (gauge): entries held by the memory cache
//! - `apiwire_realtime_updates_total` (counter): pushed field updates applied
//! - `apiwire_realtime_subscriptions` (gauge): live subscriptions

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!("apiwire_requests_total", "method" => method, "outcome" => outcome).increment(1);
    histogram!("apiwire_request_duration_seconds", "method" => method)
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("apiwire_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("apiwire_cache_entries").set(entries as f64);
}

pub fn record_realtime_update(field: &str) {
    counter!("apiwire_realtime_updates_total", "field" => field.to_string()).increment(1);
}

pub fn record_subscription_change(delta: f64) {
    gauge!("apiwire_realtime_subscriptions").increment(delta);
}
