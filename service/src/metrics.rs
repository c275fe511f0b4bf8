//! Prometheus metrics.
//!
//! Counters are recorded where the work happens (`helpdesk-core`, the
//! adapters, the worker). This module only describes them and installs the
//! exporter.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe every counter and serve them on `addr` under `/metrics`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed or
/// the listener cannot bind.
pub fn install(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!(addr = %addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "helpdesk_tickets_mutations_total",
        "Ticket mutations by operation (create, update, delete)"
    );
    describe_counter!(
        "helpdesk_ticket_cache_total",
        "Ticket cache lookups by result (hit, miss, error)"
    );
    describe_counter!(
        "helpdesk_notifications_published_total",
        "Notification events accepted by the broker"
    );
    describe_counter!(
        "helpdesk_emails_total",
        "Notification emails by outcome (delivered, failed, dead_lettered)"
    );
    describe_counter!(
        "helpdesk_consistency_gaps_total",
        "Mutations whose ticket row committed while a later step failed, by step"
    );
    describe_counter!(
        "helpdesk_dead_letters_total",
        "Dead-letter queue actions (added, resolved, discarded)"
    );
}
