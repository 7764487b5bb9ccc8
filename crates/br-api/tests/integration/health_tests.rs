//! Health, service descriptor and fallback integration tests.

use axum::http::StatusCode;
use br_core::MockBroker;
use serde_json::Value;
use std::sync::Arc;

use super::common::*;

#[tokio::test]
async fn test_health_reports_broker_status() {
    let app = create_test_app().await;

    let (status, body): (StatusCode, Value) =
        send_request(app.router, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "development");
    assert!(body["uptime"].is_u64());
    assert!(body["timestamp"].is_string());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let mqtt = &body["mqtt"];
    assert_eq!(mqtt["connected"], true);
    assert_eq!(mqtt["reconnectAttempts"], 0);
    assert_eq!(mqtt["queuedMessages"], 0);
    assert_eq!(mqtt["brokerUrl"], "mqtt://mock-broker:1883");
    assert_eq!(mqtt["clientId"], "beeper-service");
}

#[tokio::test]
async fn test_health_degraded_while_disconnected() {
    let broker = Arc::new(MockBroker::new());
    let app = build_app(create_test_state(&broker), broker);

    let (status, body): (StatusCode, Value) =
        send_request(app.router, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["mqtt"]["connected"], false);
}

#[tokio::test]
async fn test_ready_follows_broker_session() {
    let broker = Arc::new(MockBroker::new());
    let app = build_app(create_test_state(&broker), broker);

    let (status, _) = send_request_raw(app.router.clone(), get_request("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.state.manager().connect().await.unwrap();
    let (status, _) = send_request_raw(app.router, get_request("/ready")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_live_endpoint_returns_ok() {
    let app = create_test_app().await;

    let (status, _) = send_request_raw(app.router, get_request("/live")).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_service_descriptor() {
    let app = create_test_app().await;

    let (status, body): (StatusCode, Value) = send_request(app.router, get_request("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "beeper-relay");
    assert_eq!(body["endpoints"]["webhook"], "POST /webhook");
    assert_eq!(body["endpoints"]["health"], "GET /health");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = create_test_app().await;

    let (status, body): (StatusCode, Value) =
        send_request(app.router, get_request("/nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["message"], "Route GET /nope not found");
}

#[tokio::test]
async fn test_metrics_unavailable_without_recorder() {
    let app = create_test_app().await;

    let (status, _) = send_request_raw(app.router, get_request("/metrics")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = create_test_app().await;

    let response = tower::ServiceExt::oneshot(app.router, get_request("/health"))
        .await
        .unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers()["request-id"]
        .to_str()
        .unwrap()
        .starts_with("req_"));
}
