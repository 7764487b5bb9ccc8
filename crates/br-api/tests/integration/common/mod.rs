//! Common test utilities for integration tests.

use axum::{
    body::Body,
    http::{Method, StatusCode},
    Router,
};
use br_api::{compute_signature, ApiServer, AppState, WebhookValidator};
use br_core::{
    AlertRelay, AlertTransformer, ConnectionManager, ConnectionManagerConfig, MockBroker, QoS,
    TopicBuilder, TopicPolicy,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const SECRET: &str = "integration-secret";
pub const INSTALLATION_UUID: &str = "7a485448-a9e2-4c85-8a3c-4f44175783c9";

/// Router, its state and the broker behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub broker: Arc<MockBroker>,
}

/// Creates state backed by a mock broker, with signature checks on.
pub fn create_test_state(broker: &Arc<MockBroker>) -> AppState {
    let manager = ConnectionManager::new(broker.clone(), ConnectionManagerConfig::default());
    let relay = AlertRelay::new(
        AlertTransformer::default(),
        TopicBuilder::new("alerts", TopicPolicy::Hierarchical),
        QoS::AtLeastOnce,
        manager,
    );
    let validator = WebhookValidator::new(Some(SECRET.to_string()), 300);
    AppState::new(relay, validator)
}

pub fn build_app(state: AppState, broker: Arc<MockBroker>) -> TestApp {
    let router = ApiServer::with_state(state.clone()).router();
    TestApp {
        router,
        state,
        broker,
    }
}

/// App with a connected broker session.
pub async fn create_test_app() -> TestApp {
    let broker = Arc::new(MockBroker::new());
    let state = create_test_state(&broker);
    state.manager().connect().await.unwrap();
    build_app(state, broker)
}

/// Issue alert body in the shape Sentry sends for alert rule triggers.
pub fn issue_alert_body(title: &str, level: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "action": "triggered",
        "installation": {"uuid": INSTALLATION_UUID},
        "actor": {"type": "application", "id": "sentry", "name": "Sentry"},
        "data": {
            "event": {
                "id": "ec3c1b8b1f6d4b7c9d0e8a1b2c3d4e5f",
                "timestamp": 1700000000.5,
                "title": title,
                "level": level,
                "web_url": "https://sentry.example.com/issues/1/events/ec3c1b8b/",
                "environment": "production",
                "release": "api@1.4.2",
                "project": 42,
                "tags": [["server_name", "web-1"], ["environment", "production"]]
            },
            "triggered_rule": "Page on-call"
        }
    }))
    .unwrap()
}

pub fn now_timestamp() -> String {
    Utc::now().timestamp().to_string()
}

/// POST /webhook with valid headers and a signature over `body`.
pub fn signed_webhook_request(body: &[u8]) -> axum::extract::Request<Body> {
    signed_webhook_request_at(body, &now_timestamp())
}

pub fn signed_webhook_request_at(body: &[u8], timestamp: &str) -> axum::extract::Request<Body> {
    webhook_request_builder(timestamp)
        .header("sentry-hook-signature", compute_signature(body, SECRET))
        .body(Body::from(body.to_vec()))
        .unwrap()
}

/// Builder with the content type, resource and timestamp headers set.
pub fn webhook_request_builder(timestamp: &str) -> axum::http::request::Builder {
    axum::extract::Request::builder()
        .method(Method::POST)
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("sentry-hook-resource", "event_alert")
        .header("sentry-hook-timestamp", timestamp)
}

pub fn get_request(uri: &str) -> axum::extract::Request<Body> {
    axum::extract::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Sends request and parses JSON response.
pub async fn send_request<T: DeserializeOwned>(
    app: Router,
    request: axum::extract::Request<Body>,
) -> (StatusCode, T) {
    let (status, body) = send_request_raw(app, request).await;
    let parsed: T = serde_json::from_str(&body)
        .unwrap_or_else(|e| panic!("Failed to parse response: {} - Body: {:?}", e, body));
    (status, parsed)
}

/// Sends request and returns raw response body.
pub async fn send_request_raw(
    app: Router,
    request: axum::extract::Request<Body>,
) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

pub async fn send_json(app: Router, request: axum::extract::Request<Body>) -> (StatusCode, Value) {
    send_request(app, request).await
}
