//! Metrics registration and Prometheus export.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: {0}")]
    Install(String),
}

/// Registers descriptions for every metric the relay emits.
pub fn register_metrics() {
    describe_counter!(
        "br_webhooks_received_total",
        "Webhooks received, labelled by Sentry resource"
    );
    describe_counter!(
        "br_webhooks_rejected_total",
        "Webhooks rejected, labelled by reason"
    );
    describe_counter!(
        "br_webhooks_relayed_total",
        "Webhooks accepted and handed to the broker, labelled by outcome"
    );
    describe_histogram!(
        "br_webhook_duration_seconds",
        "Time from request receipt to response for accepted webhooks"
    );

    describe_counter!(
        "br_broker_published_total",
        "Messages delivered to the MQTT client"
    );
    describe_counter!(
        "br_broker_publish_failures_total",
        "Publishes rejected by the MQTT client"
    );
    describe_counter!(
        "br_broker_queued_total",
        "Messages queued while the broker was unreachable"
    );
    describe_counter!(
        "br_broker_queue_dropped_total",
        "Queued messages dropped because the outage queue was full"
    );
    describe_counter!(
        "br_broker_reconnect_attempts_total",
        "Reconnection attempts after a dropped broker link"
    );
    describe_counter!(
        "br_broker_reconnect_exhausted_total",
        "Times the reconnect budget ran out"
    );

    describe_gauge!(
        "br_broker_connected",
        "1 when the broker link is up, 0 otherwise"
    );
    describe_gauge!(
        "br_broker_queue_depth",
        "Messages currently waiting in the outage queue"
    );
}

/// Installs the global Prometheus recorder and registers descriptions.
///
/// May only succeed once per process.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;
    register_metrics();
    Ok(handle)
}
