//! Health check and service descriptor endpoints.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use std::collections::BTreeMap;

use crate::dto::{HealthResponse, ServiceInfo};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "beeper-relay";

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// Always answers `200`; the broker session shows up in `status` and
/// `mqtt` so that a broker outage does not take the relay out of rotation
/// while it is still queueing alerts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mqtt = state.manager().status();
    let status = if mqtt.connected { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_ms(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment,
        mqtt,
    })
}

/// Readiness probe: ready once the broker session is up.
async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.manager().is_connected() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness probe.
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

async fn service_info() -> Json<ServiceInfo> {
    let endpoints = [
        ("webhook", "POST /webhook"),
        ("health", "GET /health"),
        ("ready", "GET /ready"),
        ("live", "GET /live"),
        ("metrics", "GET /metrics"),
    ]
    .into_iter()
    .map(|(name, route)| (name.to_string(), route.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Relays Sentry webhook alerts to MQTT for beeper devices".to_string(),
        endpoints,
    })
}
