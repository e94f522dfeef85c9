//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_state` (gauge): 0=closed, 1=half-open, 2=open, per breaker
//! - `breaker_transitions_total` (counter): by breaker and target state
//! - `queries_total` (counter): by query name and outcome
//! - `query_duration_seconds` (histogram): by query name
//! - `log_entries_total` (counter): by level
//! - `resource_checks_total` (counter): by outcome (cached, reachable, unreachable, gave_up)
//! - `navigation_events_total` (counter)
//! - `recoveries_total` (counter)
//! - `entropy_refills_total` (counter): by source
//!
//! When no recorder is installed every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Record the current state of a breaker.
pub fn record_breaker_state(name: &str, state_value: f64) {
    gauge!("breaker_state", "breaker" => name.to_string()).set(state_value);
}

/// Record a breaker state transition.
pub fn record_breaker_transition(name: &str, to: &'static str) {
    counter!("breaker_transitions_total", "breaker" => name.to_string(), "to" => to).increment(1);
}

/// Record a measured query.
pub fn record_query(name: &str, duration: Duration, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("queries_total", "query" => name.to_string(), "outcome" => outcome).increment(1);
    histogram!("query_duration_seconds", "query" => name.to_string()).record(duration.as_secs_f64());
}

/// Record an entry accepted by the log store.
pub fn record_log_entry(level: &'static str) {
    counter!("log_entries_total", "level" => level).increment(1);
}

/// Record the outcome of a resource validation.
pub fn record_resource_check(outcome: &'static str) {
    counter!("resource_checks_total", "outcome" => outcome).increment(1);
}

/// Record a navigation event.
pub fn record_navigation() {
    counter!("navigation_events_total").increment(1);
}

/// Record an automatic recovery run.
pub fn record_recovery() {
    counter!("recoveries_total").increment(1);
}

/// Record a refill of the random number cache.
pub fn record_entropy_refill(source: &'static str) {
    counter!("entropy_refills_total", "source" => source).increment(1);
}
