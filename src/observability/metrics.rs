//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rekey_balancer_requests_total` (counter): dispatches by operation, status, node
//! - `rekey_balancer_request_duration_seconds` (histogram): dispatch latency by operation
//! - `rekey_balancer_node_healthy` (gauge): 1=healthy, 0=unhealthy, per node
//! - `rekey_balancer_healthy_nodes` (gauge): size of the published healthy set
//! - `rekey_balancer_probe_cycle_seconds` (histogram): duration of one probing cycle
//! - `rekey_balancer_audit_failures_total` (counter): audit records that were dropped
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(operation: &str, status: u16, node: &str, start: Instant) {
    counter!(
        "rekey_balancer_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string(),
        "node" => node.to_string()
    )
    .increment(1);
    histogram!(
        "rekey_balancer_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_node_health(node: &str, healthy: bool) {
    gauge!("rekey_balancer_node_healthy", "node" => node.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_healthy_nodes(count: usize) {
    gauge!("rekey_balancer_healthy_nodes").set(count as f64);
}

pub fn record_probe_cycle(elapsed: Duration) {
    histogram!("rekey_balancer_probe_cycle_seconds").record(elapsed.as_secs_f64());
}

pub fn record_audit_failure() {
    counter!("rekey_balancer_audit_failures_total").increment(1);
}
