//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): dispatch outcomes
//! - `dispatch_retries_total` (counter): retried upstream errors by kind
//! - `circuit_breaker_transitions_total` (counter): by dependency, target state
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `results_processed_total` (counter): consumer outcomes by priority
//! - `queue_dead_letters_total` (counter), `queue_depth` (gauge)
//! - `status_polls_total` (counter): status tracker lookups
//! - `notifications_failed_total` (counter)

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use crate::error::ErrorKind;
use crate::queue::Priority;
use crate::resilience::CircuitStatus;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(outcome: &'static str) {
    counter!("dispatch_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_dispatch_retry(kind: ErrorKind) {
    counter!("dispatch_retries_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_breaker_transition(dependency: &str, to: CircuitStatus) {
    counter!(
        "circuit_breaker_transitions_total",
        "dependency" => dependency.to_string(),
        "to" => to.as_str()
    )
    .increment(1);

    let value = match to {
        CircuitStatus::Closed => 0.0,
        CircuitStatus::HalfOpen => 1.0,
        CircuitStatus::Open => 2.0,
    };
    gauge!("circuit_breaker_state", "dependency" => dependency.to_string()).set(value);
}

pub fn record_result(outcome: &'static str, priority: Priority) {
    counter!(
        "results_processed_total",
        "outcome" => outcome,
        "priority" => priority.as_str()
    )
    .increment(1);
}

pub fn record_dead_letter(priority: Priority) {
    counter!("queue_dead_letters_total", "priority" => priority.as_str()).increment(1);
}

pub fn record_queue_depth(priority: Priority, depth: usize) {
    gauge!("queue_depth", "priority" => priority.as_str()).set(depth as f64);
}

pub fn record_status_poll(outcome: &'static str) {
    counter!("status_polls_total", "outcome" => outcome).increment(1);
}

pub fn record_notification_failure() {
    counter!("notifications_failed_total").increment(1);
}
