//! Response bodies.

use br_core::{ConnectionStatus, Environment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of a `200` from `POST /webhook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAcceptedResponse {
    pub status: String,
    pub message: String,
    pub request_id: String,
}

impl WebhookAcceptedResponse {
    pub fn success(request_id: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: "Webhook processed successfully".to_string(),
            request_id: request_id.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` while the broker session is up, `degraded` otherwise.
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since startup.
    pub uptime: u64,
    pub version: String,
    pub environment: Environment,
    pub mqtt: ConnectionStatus,
}

/// Service descriptor served at `/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub description: String,
    pub endpoints: BTreeMap<String, String>,
}
