//! Sentry webhook intake.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware,
    routing::post,
    Extension, Json, Router,
};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

use crate::dto::WebhookAcceptedResponse;
use crate::error::ApiError;
use crate::middleware::{generate_request_id, ip_allowlist, RequestId};
use crate::state::AppState;
use crate::webhooks::headers::HOOK_RESOURCE;

/// Creates webhook routes, guarded by the source allowlist.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route_layer(middleware::from_fn_with_state(state, ip_allowlist))
}

/// Validates a Sentry webhook and relays it to the broker.
///
/// Broker outages do not fail the request: the alert is queued by the
/// connection manager and the caller still gets `200`.
pub async fn receive_webhook(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAcceptedResponse>, ApiError> {
    let started = Instant::now();
    let request_id = request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(generate_request_id);

    let resource = headers
        .get(HOOK_RESOURCE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    counter!("br_webhooks_received_total", "resource" => resource.clone()).increment(1);

    let validated = match state.validator.validate(&headers, &body) {
        Ok(validated) => validated,
        Err(rejection) => {
            warn!(
                request_id = %request_id,
                resource = %resource,
                reason = rejection.reason(),
                error = %rejection,
                "Rejected webhook"
            );
            counter!("br_webhooks_rejected_total", "reason" => rejection.reason()).increment(1);
            return Err(rejection.into());
        }
    };

    info!(
        request_id = %request_id,
        resource = %resource,
        action = %validated.payload.action,
        variant = validated.payload.body.variant_name(),
        "Webhook received"
    );

    let span = br_observability::webhook_span!(request_id, resource = %resource);
    let receipt = state
        .relay
        .relay(&validated.payload)
        .instrument(span)
        .await
        .map_err(|e| {
            error!(request_id = %request_id, error = %e, "Failed to relay webhook");
            ApiError::internal(e, Some(request_id.clone()), state.environment)
        })?;

    counter!("br_webhooks_relayed_total", "outcome" => receipt.outcome.as_str()).increment(1);
    histogram!("br_webhook_duration_seconds").record(started.elapsed().as_secs_f64());

    info!(
        request_id = %request_id,
        message_id = %receipt.message_id,
        topic = %receipt.topic,
        outcome = receipt.outcome.as_str(),
        "Webhook processed successfully"
    );

    Ok(Json(WebhookAcceptedResponse::success(request_id)))
}
