//! Sentry webhook request headers.

use axum::http::{header, HeaderMap};
use uuid::Uuid;

pub const HOOK_RESOURCE: &str = "sentry-hook-resource";
pub const HOOK_TIMESTAMP: &str = "sentry-hook-timestamp";
pub const HOOK_SIGNATURE: &str = "sentry-hook-signature";
pub const REQUEST_ID: &str = "request-id";

/// Headers a Sentry integration webhook must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentryHeaders {
    /// e.g. `event_alert`, `issue`, `installation`
    pub resource: String,
    pub timestamp: String,
    pub signature: Option<String>,
    pub request_id: Option<Uuid>,
}

impl SentryHeaders {
    /// Extracts and checks the webhook headers.
    ///
    /// Every problem is collected, so the error lists all of them at once.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, String> {
        let mut problems = Vec::new();

        match text(headers, header::CONTENT_TYPE.as_str()) {
            Some(value) if is_json_media_type(&value) => {}
            Some(value) => problems.push(format!(
                "content-type must be application/json, got '{}'",
                value
            )),
            None => problems.push("content-type is required".to_string()),
        }

        let resource = required(headers, HOOK_RESOURCE, &mut problems);
        let timestamp = required(headers, HOOK_TIMESTAMP, &mut problems);
        let signature = text(headers, HOOK_SIGNATURE);

        let request_id = match text(headers, REQUEST_ID) {
            Some(raw) => match Uuid::parse_str(&raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    problems.push(format!("{} must be a UUID", REQUEST_ID));
                    None
                }
            },
            None => None,
        };

        match (resource, timestamp, problems.is_empty()) {
            (Some(resource), Some(timestamp), true) => Ok(Self {
                resource,
                timestamp,
                signature,
                request_id,
            }),
            _ => Err(format!(
                "Missing or invalid required headers: {}",
                problems.join("; ")
            )),
        }
    }
}

fn text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn required(headers: &HeaderMap, name: &str, problems: &mut Vec<String>) -> Option<String> {
    match headers.get(name) {
        Some(value) => match value.to_str() {
            Ok(value) => Some(value.to_string()),
            Err(_) => {
                problems.push(format!("{} is not valid text", name));
                None
            }
        },
        None => {
            problems.push(format!("{} is required", name));
            None
        }
    }
}

/// `application/json`, optionally with parameters such as a charset.
fn is_json_media_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
