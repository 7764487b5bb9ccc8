//! `POST /webhook` integration tests.

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use br_api::IpAllowlist;
use br_core::{MockBroker, NormalizedAlertMessage, Priority};
use chrono::Utc;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use super::common::*;

#[tokio::test]
async fn test_fatal_alert_is_relayed_as_critical() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");

    let (status, response) = send_json(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "success");
    assert_eq!(response["message"], "Webhook processed successfully");
    assert!(response["requestId"].as_str().unwrap().starts_with("req_"));

    let published = app.broker.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "alerts/critical/triggered");

    let message: NormalizedAlertMessage = published[0].json().unwrap();
    assert_eq!(message.priority, Priority::Critical);
    assert_eq!(message.source, "sentry");
    assert_eq!(message.kind, "triggered");
    assert_eq!(message.data.title, "DB down");
    assert_eq!(message.data.message, "Rule: Page on-call");
    assert_eq!(message.data.project, "42");
    assert_eq!(message.data.tags["server_name"], "web-1");
    assert!(message.id.starts_with("sentry_"));
}

#[tokio::test]
async fn test_request_id_header_is_echoed() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "error");
    let request_id = "5f0f3a52-1c1e-4f58-9c2a-0d5b8a6e7c11";

    let request = webhook_request_builder(&now_timestamp())
        .header("sentry-hook-signature", compute(&body))
        .header("request-id", request_id)
        .body(Body::from(body))
        .unwrap();
    let (status, response) = send_json(app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["requestId"], request_id);
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected_without_publishing() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");
    let ten_minutes_ago = (Utc::now().timestamp() - 600).to_string();

    let (status, response) =
        send_json(app.router, signed_webhook_request_at(&body, &ten_minutes_ago)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Invalid timestamp");
    assert!(app.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");

    let request = webhook_request_builder(&now_timestamp())
        .header("sentry-hook-signature", "0".repeat(64))
        .body(Body::from(body))
        .unwrap();
    let (status, response) = send_json(app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "Unauthorized");
    assert_eq!(response["message"], "Invalid signature");
    assert!(app.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized_when_secret_set() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");

    let request = webhook_request_builder(&now_timestamp())
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request_raw(app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signature_checked_before_timestamp() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");

    let request = webhook_request_builder("not-a-number")
        .header("sentry-hook-signature", "deadbeef")
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request_raw(app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_headers_are_rejected() {
    let app = create_test_app().await;
    let body = issue_alert_body("DB down", "fatal");

    let request = axum::extract::Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "text/plain")
        .body(Body::from(body))
        .unwrap();
    let (status, response) = send_json(app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Invalid headers");
    let message = response["message"].as_str().unwrap();
    assert!(message.contains("sentry-hook-resource"));
    assert!(message.contains("sentry-hook-timestamp"));
    assert!(app.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_schema_failure_lists_issues() {
    let app = create_test_app().await;
    let body = serde_json::to_vec(&json!({
        "action": "triggered",
        "installation": {"uuid": "not-a-uuid"},
        "data": {}
    }))
    .unwrap();

    let (status, response) = send_json(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Invalid payload");
    let details = response["details"].as_array().unwrap();
    assert!(details
        .iter()
        .any(|issue| issue["path"] == "installation.uuid"));
    assert!(app.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_invalid_payload() {
    let app = create_test_app().await;
    let body = b"{not json".to_vec();

    let (status, response) = send_json(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "Invalid payload");
}

#[tokio::test]
async fn test_empty_data_uses_defaults() {
    let app = create_test_app().await;
    let body = serde_json::to_vec(&json!({
        "action": "created",
        "installation": {"uuid": INSTALLATION_UUID},
        "data": {}
    }))
    .unwrap();

    let (status, _) = send_request_raw(app.router, signed_webhook_request(&body)).await;
    assert_eq!(status, StatusCode::OK);

    let published = app.broker.published().await;
    assert_eq!(published[0].topic, "alerts/medium/created");
    let message: Value = published[0].json().unwrap();
    assert_eq!(message["data"]["title"], "Sentry Alert");
    assert_eq!(message["data"]["level"], "info");
    assert_eq!(message["priority"], "medium");
}

#[tokio::test]
async fn test_webhook_accepted_while_broker_down() {
    let broker = Arc::new(MockBroker::new());
    let state = create_test_state(&broker);
    let app = build_app(state, broker);
    let body = issue_alert_body("DB down", "fatal");

    let (status, _) = send_request_raw(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.broker.published().await.is_empty());
    assert_eq!(app.state.manager().status().queued_messages, 1);
}

#[tokio::test]
async fn test_unsigned_webhooks_accepted_without_secret() {
    let broker = Arc::new(MockBroker::new());
    let mut state = create_test_state(&broker);
    state.validator = Arc::new(br_api::WebhookValidator::default());
    state.manager().connect().await.unwrap();
    let app = build_app(state, broker);
    let body = issue_alert_body("Slow query", "warning");

    let request = webhook_request_builder(&now_timestamp())
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request_raw(app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        app.broker.published_topics().await,
        vec!["alerts/medium/triggered".to_string()]
    );
}

#[tokio::test]
async fn test_minimal_fatal_alert_without_secret() {
    let broker = Arc::new(MockBroker::new());
    let mut state = create_test_state(&broker);
    state.validator = Arc::new(br_api::WebhookValidator::default());
    state.manager().connect().await.unwrap();
    let app = build_app(state, broker);
    let body = serde_json::to_vec(&json!({
        "action": "triggered",
        "installation": {"uuid": INSTALLATION_UUID},
        "data": {"event": {"title": "DB down", "level": "fatal"}}
    }))
    .unwrap();

    let request = axum::extract::Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("sentry-hook-resource", "error.created")
        .header("sentry-hook-timestamp", now_timestamp())
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_request_raw(app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    let published = app.broker.published().await;
    assert_eq!(published.len(), 1);
    let message: NormalizedAlertMessage = published[0].json().unwrap();
    assert_eq!(message.priority, Priority::Critical);
    assert_eq!(message.data.title, "DB down");
}

fn from_peer(mut request: Request<Body>, peer: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((peer, 40000))));
    request
}

async fn allowlisted_app(allowlist: IpAllowlist) -> TestApp {
    let broker = Arc::new(MockBroker::new());
    let state = create_test_state(&broker).with_allowlist(allowlist);
    state.manager().connect().await.unwrap();
    build_app(state, broker)
}

#[tokio::test]
async fn test_allowlist_blocks_unknown_sources() {
    let app = allowlisted_app(IpAllowlist::parse(["35.184.238.160"]).unwrap()).await;
    let body = issue_alert_body("DB down", "fatal");

    let request = from_peer(signed_webhook_request(&body), [203, 0, 113, 5]);
    let (status, response) = send_json(app.router.clone(), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "Forbidden");

    let request = from_peer(signed_webhook_request(&body), [35, 184, 238, 160]);
    let (status, _) = send_request_raw(app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(app.broker.published().await.len(), 1);
}

#[tokio::test]
async fn test_allowlist_ignores_forwarded_for_from_direct_clients() {
    let app = allowlisted_app(IpAllowlist::parse(["35.184.238.160"]).unwrap()).await;
    let body = issue_alert_body("DB down", "fatal");

    let mut request = from_peer(signed_webhook_request(&body), [203, 0, 113, 5]);
    request
        .headers_mut()
        .insert("x-forwarded-for", "35.184.238.160".parse().unwrap());
    let (status, _) = send_request_raw(app.router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.broker.published().await.is_empty());
}

#[tokio::test]
async fn test_allowlist_behind_trusted_proxy() {
    let allowlist = IpAllowlist::parse(["35.184.238.160"])
        .unwrap()
        .with_trusted_proxy_list(["10.0.0.1"])
        .unwrap();
    let app = allowlisted_app(allowlist).await;
    let body = issue_alert_body("DB down", "fatal");

    let mut request = from_peer(signed_webhook_request(&body), [10, 0, 0, 1]);
    request
        .headers_mut()
        .insert("x-forwarded-for", "35.184.238.160".parse().unwrap());
    let (status, _) = send_request_raw(app.router.clone(), request).await;
    assert_eq!(status, StatusCode::OK);

    // A spoofed left-most hop does not help once the proxy appends the real peer.
    let mut request = from_peer(signed_webhook_request(&body), [10, 0, 0, 1]);
    request
        .headers_mut()
        .insert("x-forwarded-for", "35.184.238.160, 203.0.113.5".parse().unwrap());
    let (status, _) = send_request_raw(app.router, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(app.broker.published().await.len(), 1);
}

#[tokio::test]
async fn test_allowlist_rejects_unknown_peer() {
    let app = allowlisted_app(IpAllowlist::parse(["35.184.238.160"]).unwrap()).await;
    let body = issue_alert_body("DB down", "fatal");

    let (status, _) = send_request_raw(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = create_test_app().await;
    let body = vec![b' '; 2 * 1024 * 1024];

    let (status, _) = send_request_raw(app.router, signed_webhook_request(&body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

fn compute(body: &[u8]) -> String {
    br_api::compute_signature(body, SECRET)
}
