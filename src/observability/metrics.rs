//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_queries_total` (counter): executed queries by database, intent, outcome
//! - `balancer_submit_duration_seconds` (histogram): caller-observed latency
//! - `balancer_stale_completions_total` (counter): completions nobody waited for
//! - `balancer_routing_exhausted_total` (counter): reads with no eligible database
//! - `balancer_submit_timeouts_total` (counter): abandoned calls
//! - `balancer_probe_failures_total` (counter): failed load probes by database
//! - `balancer_queue_depth` (gauge): pending queries by database
//! - `balancer_database_up` (gauge): 1=up, 0=down
//! - `balancer_load_estimate` (gauge): last load copied from telemetry

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::query::Intent;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_query(database: &str, intent: Intent, ok: bool) {
    metrics::counter!(
        "balancer_queries_total",
        "database" => database.to_string(),
        "intent" => intent.as_str(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_submit(intent: Intent, elapsed: Duration, ok: bool) {
    metrics::histogram!(
        "balancer_submit_duration_seconds",
        "intent" => intent.as_str(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_stale_completion() {
    metrics::counter!("balancer_stale_completions_total").increment(1);
}

pub fn record_routing_exhausted() {
    metrics::counter!("balancer_routing_exhausted_total").increment(1);
}

pub fn record_submit_timeout() {
    metrics::counter!("balancer_submit_timeouts_total").increment(1);
}

pub fn record_probe_failure(database: &str) {
    metrics::counter!("balancer_probe_failures_total", "database" => database.to_string()).increment(1);
}

pub fn record_queue_depth(database: &str, depth: usize) {
    metrics::gauge!("balancer_queue_depth", "database" => database.to_string()).set(depth as f64);
}

pub fn record_database_health(database: &str, up: bool) {
    metrics::gauge!("balancer_database_up", "database" => database.to_string())
        .set(if up { 1.0 } else { 0.0 });
}

pub fn record_load_estimate(database: &str, load: f64) {
    metrics::gauge!("balancer_load_estimate", "database" => database.to_string()).set(load);
}
