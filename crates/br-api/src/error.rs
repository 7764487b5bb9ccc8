//! API error types and handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use br_core::{Environment, SchemaIssue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error type.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Required webhook headers missing or malformed.
    #[error("Invalid headers: {0}")]
    InvalidHeaders(String),

    /// Webhook signature validation failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp outside the accepted window.
    #[error("Webhook timestamp is too old or invalid")]
    InvalidTimestamp,

    /// Body failed schema validation.
    #[error("Webhook payload does not match expected schema")]
    InvalidPayload(Vec<SchemaIssue>),

    /// Client address not in the allowlist.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No route for this method and path.
    #[error("{0}")]
    NotFound(String),

    /// Internal server error.
    ///
    /// `detail` is only shown outside production.
    #[error("Internal error: {detail}")]
    Internal {
        detail: String,
        request_id: Option<String>,
        expose: bool,
    },
}

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Short error category.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Request ID for tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    /// Wraps an unexpected failure, hiding its text in production.
    pub fn internal(
        err: impl std::fmt::Display,
        request_id: Option<String>,
        environment: Environment,
    ) -> Self {
        ApiError::Internal {
            detail: err.to_string(),
            request_id,
            expose: !environment.is_production(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidHeaders(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ApiError::InvalidTimestamp => StatusCode::BAD_REQUEST,
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the `error` field of the response body.
    pub fn error_label(&self) -> &'static str {
        match self {
            ApiError::InvalidHeaders(_) => "Invalid headers",
            ApiError::InvalidSignature => "Unauthorized",
            ApiError::InvalidTimestamp => "Invalid timestamp",
            ApiError::InvalidPayload(_) => "Invalid payload",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "Not Found",
            ApiError::Internal { .. } => "Internal server error",
        }
    }

    fn body(&self) -> ErrorResponse {
        let (message, details, request_id) = match self {
            ApiError::InvalidHeaders(msg) => (msg.clone(), None, None),
            ApiError::InvalidPayload(issues) => (
                self.to_string(),
                Some(serde_json::to_value(issues).unwrap_or_default()),
                None,
            ),
            ApiError::Forbidden(msg) | ApiError::NotFound(msg) => (msg.clone(), None, None),
            ApiError::Internal {
                detail,
                request_id,
                expose,
            } => {
                let message = if *expose {
                    detail.clone()
                } else {
                    "Failed to process webhook".to_string()
                };
                (message, None, request_id.clone())
            }
            _ => (self.to_string(), None, None),
        };

        ErrorResponse {
            error: self.error_label().to_string(),
            message,
            details,
            request_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
