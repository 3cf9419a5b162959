//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ipedia_requests_total` (counter): completed requests by outcome
//!   (`ok` or the error name)
//! - `ipedia_lookup_limited_total` (counter): lookups refused by the limiter
//! - `ipedia_database_switches_total` (counter): current-database changes by
//!   language
//! - `ipedia_connections_accepted_total` (counter): accepted connections by
//!   port (`client`, `admin`)
//! - `ipedia_active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; the Prometheus exporter is
//!   installed only when enabled in config

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::protocol::ServerError;

/// Start the Prometheus scrape endpoint. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_request(error: Option<ServerError>) {
    let outcome = match error {
        None => "ok",
        Some(e) => e.name(),
    };
    metrics::counter!("ipedia_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_lookup_limited() {
    metrics::counter!("ipedia_lookup_limited_total").increment(1);
}

pub fn record_database_switch(lang: &'static str) {
    metrics::counter!("ipedia_database_switches_total", "lang" => lang).increment(1);
}

pub fn record_connection_accepted(port: &'static str) {
    metrics::counter!("ipedia_connections_accepted_total", "port" => port).increment(1);
}

pub fn set_active_connections(count: usize) {
    metrics::gauge!("ipedia_active_connections").set(count as f64);
}
