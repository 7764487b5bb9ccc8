//! Application state shared across handlers.

use br_core::{AlertRelay, ConnectionManager, Environment};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::middleware::IpAllowlist;
use crate::webhooks::WebhookValidator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Transformer, topic builder and connection manager.
    pub relay: Arc<AlertRelay>,
    /// Header, signature, timestamp and schema checks.
    pub validator: Arc<WebhookValidator>,
    /// Source addresses allowed to post webhooks. Empty allows everyone.
    pub allowlist: Arc<IpAllowlist>,
    /// Deployment environment, controls error detail exposure.
    pub environment: Environment,
    /// When the process started serving.
    pub started_at: Instant,
    /// Prometheus metrics handle for rendering metrics.
    pub prometheus_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(relay: AlertRelay, validator: WebhookValidator) -> Self {
        info!(
            signature_verification = validator.verifies_signatures(),
            timestamp_tolerance_secs = validator.tolerance_secs(),
            "Webhook validator initialized"
        );

        Self {
            relay: Arc::new(relay),
            validator: Arc::new(validator),
            allowlist: Arc::new(IpAllowlist::default()),
            environment: Environment::default(),
            started_at: Instant::now(),
            prometheus_handle: None,
        }
    }

    /// Sets the deployment environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Restricts `/webhook` to the given source addresses.
    pub fn with_allowlist(mut self, allowlist: IpAllowlist) -> Self {
        self.allowlist = Arc::new(allowlist);
        self
    }

    /// Creates a new application state with Prometheus handle.
    pub fn with_prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(Arc::new(handle));
        self
    }

    pub fn manager(&self) -> &ConnectionManager {
        self.relay.manager()
    }

    /// Milliseconds since the state was created.
    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
