//! Ordered accept/reject checks for inbound webhooks.
//!
//! Headers, then signature, then timestamp, then schema. The first failing
//! check decides the rejection; later checks are not run.

use axum::http::HeaderMap;
use br_core::{PayloadError, SchemaIssue, WebhookPayload};
use thiserror::Error;

use super::headers::SentryHeaders;
use super::signature::verify_signature;
use super::timestamp::{is_timestamp_valid, DEFAULT_TOLERANCE_SECS};
use crate::error::ApiError;

/// Why a webhook was refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WebhookRejection {
    #[error("{0}")]
    InvalidHeaders(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Webhook timestamp is too old or invalid")]
    StaleTimestamp,

    #[error("Payload does not match expected schema")]
    InvalidPayload(Vec<SchemaIssue>),
}

impl WebhookRejection {
    /// Metric label for this rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            WebhookRejection::InvalidHeaders(_) => "headers",
            WebhookRejection::InvalidSignature => "signature",
            WebhookRejection::StaleTimestamp => "timestamp",
            WebhookRejection::InvalidPayload(_) => "schema",
        }
    }
}

impl From<PayloadError> for WebhookRejection {
    fn from(err: PayloadError) -> Self {
        WebhookRejection::InvalidPayload(err.issues())
    }
}

impl From<WebhookRejection> for ApiError {
    fn from(rejection: WebhookRejection) -> Self {
        match rejection {
            WebhookRejection::InvalidHeaders(msg) => ApiError::InvalidHeaders(msg),
            WebhookRejection::InvalidSignature => ApiError::InvalidSignature,
            WebhookRejection::StaleTimestamp => ApiError::InvalidTimestamp,
            WebhookRejection::InvalidPayload(issues) => ApiError::InvalidPayload(issues),
        }
    }
}

/// A webhook that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedWebhook {
    pub headers: SentryHeaders,
    pub payload: WebhookPayload,
}

/// Runs the validation pipeline.
#[derive(Debug, Clone)]
pub struct WebhookValidator {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl Default for WebhookValidator {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }
}

impl WebhookValidator {
    /// An empty secret is treated as no secret.
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs,
        }
    }

    pub fn verifies_signatures(&self) -> bool {
        self.secret.is_some()
    }

    pub fn tolerance_secs(&self) -> u64 {
        self.tolerance_secs
    }

    pub fn validate(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<ValidatedWebhook, WebhookRejection> {
        let sentry_headers =
            SentryHeaders::from_headers(headers).map_err(WebhookRejection::InvalidHeaders)?;

        if let Some(secret) = &self.secret {
            let signature = sentry_headers.signature.as_deref().unwrap_or_default();
            if !verify_signature(body, signature, secret) {
                return Err(WebhookRejection::InvalidSignature);
            }
        }

        if !is_timestamp_valid(&sentry_headers.timestamp, self.tolerance_secs) {
            return Err(WebhookRejection::StaleTimestamp);
        }

        let payload = WebhookPayload::from_slice(body)?;

        Ok(ValidatedWebhook {
            headers: sentry_headers,
            payload,
        })
    }
}
