//! Prometheus metrics for the chat server.

use anyhow::{Context, Result};
use chorus_core::HubStats;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chorus_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "chorus_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "chorus_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "chorus_messages_total";
    pub const MESSAGES_BYTES: &str = "chorus_messages_bytes";
    pub const SUBMIT_SECONDS: &str = "chorus_submit_seconds";
    pub const HUB_CLIENTS: &str = "chorus_hub_clients";
    pub const HUB_HISTORY: &str = "chorus_hub_history_len";
    pub const ERRORS_TOTAL: &str = "chorus_errors_total";
}

/// Inbound or outbound traffic, as seen from the server.
#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Register metric descriptions.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused because the server was full"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages");
    metrics::describe_histogram!(
        names::SUBMIT_SECONDS,
        "Time for the hub to accept a submitted message"
    );
    metrics::describe_gauge!(names::HUB_CLIENTS, "Sessions registered with the hub");
    metrics::describe_gauge!(names::HUB_HISTORY, "Messages retained for replay");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if the exporter cannot bind its listener.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_rejected() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

pub fn record_message(bytes: usize, direction: Direction) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.as_str()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.as_str()).increment(bytes as u64);
}

pub fn record_submit_latency(seconds: f64) {
    histogram!(names::SUBMIT_SECONDS).record(seconds);
}

/// Mirror a hub snapshot into gauges.
pub fn record_hub_stats(stats: &HubStats) {
    gauge!(names::HUB_CLIENTS).set(stats.clients as f64);
    gauge!(names::HUB_HISTORY).set(stats.history_len as f64);
}

pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Records a connection on creation and a disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
