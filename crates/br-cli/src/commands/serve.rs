//! Serve command - connects to the broker and starts the HTTP server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use br_api::{ApiServer, ApiServerConfig, AppState, WebhookValidator};
use br_core::{
    AlertRelay, AlertTransformer, BrokerTransport, ConnectionManager, ConnectionManagerConfig,
    MockBroker, MqttTransport, MqttTransportConfig, TopicBuilder,
};

use crate::config::AppConfig;

/// Options that only make sense for `serve`.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Use the in-memory broker instead of connecting to MQTT.
    pub mock_broker: bool,
}

/// Builds the broker transport described by `config`.
pub fn build_transport(config: &AppConfig, options: &ServeOptions) -> Result<Arc<dyn BrokerTransport>> {
    let mqtt = &config.mqtt;

    if options.mock_broker {
        return Ok(Arc::new(MockBroker::with_endpoint(
            mqtt.broker_url.clone(),
            mqtt.client_id.clone(),
        )));
    }

    let transport = MqttTransport::new(MqttTransportConfig {
        broker_url: mqtt.broker_url.clone(),
        client_id: mqtt.client_id.clone(),
        username: mqtt.username.clone(),
        password: mqtt.password.clone(),
        keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
        connect_timeout: Duration::from_secs(mqtt.connect_timeout_secs),
    })
    .context("Invalid MQTT configuration")?;

    Ok(Arc::new(transport))
}

/// Builds the application state around `transport`.
pub fn build_state(config: &AppConfig, transport: Arc<dyn BrokerTransport>) -> Result<AppState> {
    let manager = ConnectionManager::new(
        transport,
        ConnectionManagerConfig {
            reconnect: config.mqtt.reconnect,
            max_queued_messages: config.mqtt.max_queued_messages,
            publish_timeout: Duration::from_secs(config.mqtt.publish_timeout_secs),
        },
    );

    let relay = AlertRelay::new(
        AlertTransformer::new(config.priority),
        TopicBuilder::new(config.mqtt.topic_prefix.clone(), config.mqtt.topic_policy),
        config.qos()?,
        manager,
    );

    let validator = WebhookValidator::new(
        config.sentry.webhook_secret.clone(),
        config.sentry.timestamp_tolerance_secs,
    );

    Ok(AppState::new(relay, validator)
        .with_environment(config.server.environment)
        .with_allowlist(config.allowlist()?))
}

/// Runs the relay until Ctrl+C or SIGTERM.
pub async fn run_server(config: AppConfig, options: ServeOptions) -> Result<()> {
    println!("{} Starting Beeper Relay...", "[server]".cyan());

    let transport = build_transport(&config, &options)?;
    let mut state = build_state(&config, transport)?;

    match br_observability::install_prometheus_recorder() {
        Ok(handle) => state = state.with_prometheus_handle(handle),
        Err(e) => warn!(error = %e, "Prometheus metrics disabled"),
    }

    let broker_label = if options.mock_broker {
        format!("{} (mock)", config.mqtt.broker_url)
    } else {
        config.mqtt.broker_url.clone()
    };
    println!("  {} Broker: {}", "→".green(), broker_label);

    // A broker that is unreachable at startup is fatal. Drops after this
    // point are handled by the reconnect loop.
    state
        .manager()
        .connect()
        .await
        .with_context(|| format!("Failed to connect to MQTT broker at {}", config.mqtt.broker_url))?;
    println!("  {} Connected", "✓".green());

    let bind_address = config.bind_address()?;
    let topics = state.relay.topics().clone();

    println!();
    println!("{}", "Beeper Relay".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    println!("  {} {}", "Environment:".cyan(), config.server.environment);
    println!(
        "  {} {} ({})",
        "Topics:".cyan(),
        topics.subscription_filter(),
        topics.policy()
    );
    println!("  {} {}", "Priority:".cyan(), config.priority);
    println!(
        "  {} {}",
        "Signatures:".cyan(),
        if state.validator.verifies_signatures() {
            "verified".green()
        } else {
            "NOT verified".yellow()
        }
    );

    println!();
    println!("{}", "Endpoints:".bold());
    println!("  POST /webhook   - Sentry webhook intake");
    println!("  GET  /health    - Health check");
    println!("  GET  /ready     - Readiness probe");
    println!("  GET  /live      - Liveness probe");
    println!("  GET  /metrics   - Prometheus metrics");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    let server = ApiServer::new(state, ApiServerConfig { bind_address });
    server.run().await.context("Server error")?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
