//! Payload-to-alert transformation.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::alert::{AlertData, NormalizedAlertMessage, PriorityPolicy, ALERT_SOURCE};
use crate::payload::WebhookPayload;

const DEFAULT_TITLE: &str = "Sentry Alert";
const DEFAULT_EVENT_TITLE: &str = "Sentry Error";
const DEFAULT_LEVEL: &str = "info";
const DEFAULT_EVENT_LEVEL: &str = "error";
const UNKNOWN_TYPE: &str = "unknown";
const ID_SUFFIX_LEN: usize = 9;

/// Turns validated webhook payloads into [`NormalizedAlertMessage`]s.
///
/// Transformation is total: every payload that passed envelope validation
/// produces a message, with defaults filling whatever the payload lacks.
#[derive(Debug, Clone, Default)]
pub struct AlertTransformer {
    priority_policy: PriorityPolicy,
}

impl AlertTransformer {
    pub fn new(priority_policy: PriorityPolicy) -> Self {
        Self { priority_policy }
    }

    pub fn priority_policy(&self) -> PriorityPolicy {
        self.priority_policy
    }

    pub fn transform(&self, payload: &WebhookPayload) -> NormalizedAlertMessage {
        let event = payload.event();

        let mut data = match &event {
            Some(event) => AlertData {
                title: non_empty(&event.title).unwrap_or(DEFAULT_EVENT_TITLE).to_string(),
                message: event.message.clone().unwrap_or_default(),
                level: non_empty(&event.level).unwrap_or(DEFAULT_EVENT_LEVEL).to_string(),
                url: event.url.clone().unwrap_or_default(),
                environment: event.environment.clone().unwrap_or_default(),
                release: event.release.clone().unwrap_or_default(),
                project: event.project.clone().unwrap_or_default(),
                tags: event.tag_map(),
            },
            None => AlertData {
                title: DEFAULT_TITLE.to_string(),
                level: DEFAULT_LEVEL.to_string(),
                ..Default::default()
            },
        };

        if let Some(rule) = payload.triggered_rule() {
            data.message = format!("Rule: {}", rule);
        }

        // An event without a level still counts as "an event", which ranks low.
        let priority = self.priority_policy.resolve(
            event
                .as_ref()
                .map(|event| event.level.as_deref().unwrap_or_default()),
        );

        let kind = if payload.action.is_empty() {
            UNKNOWN_TYPE.to_string()
        } else {
            payload.action.clone()
        };

        NormalizedAlertMessage {
            id: generate_message_id(),
            timestamp: Utc::now(),
            source: ALERT_SOURCE.to_string(),
            kind,
            priority,
            data,
            raw: payload.raw().clone(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `sentry_<epochMillis>_<9 lowercase base-36 chars>`
pub fn generate_message_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|c| (c as char).to_ascii_lowercase())
        .take(ID_SUFFIX_LEN)
        .collect();
    format!("{}_{}_{}", ALERT_SOURCE, Utc::now().timestamp_millis(), suffix)
}
