//! Sentry integration webhook payloads.
//!
//! Sentry sends several payload shapes through the same endpoint. They all
//! share an envelope (`action`, `installation`, optional `actor`, `data`),
//! which is validated strictly. The body is then classified by `action` into
//! a typed variant, falling back to [`PayloadBody::Generic`] when the data
//! does not fit a known shape. The original JSON is kept alongside so the
//! relayed message can carry it untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// One reason a payload was rejected, addressed by a dotted JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors produced while parsing a webhook body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadError {
    /// Body is not JSON at all.
    #[error("Malformed JSON body: {0}")]
    Malformed(String),

    /// Body is JSON but does not match the envelope schema.
    #[error("Payload does not match expected schema ({} issue(s))", .0.len())]
    Schema(Vec<SchemaIssue>),
}

impl PayloadError {
    /// Flattens the error into a list of issues suitable for a response body.
    pub fn issues(&self) -> Vec<SchemaIssue> {
        match self {
            PayloadError::Malformed(msg) => vec![SchemaIssue::new("", msg.clone())],
            PayloadError::Schema(issues) => issues.clone(),
        }
    }
}

/// Who triggered the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Application,
}

/// Actor ids are strings for applications and numbers for some users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActorId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorKind,
    pub id: ActorId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    pub uuid: Uuid,
}

/// Event level as Sentry reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

/// Strictly typed event inside an issue alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentryEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    pub level: EventLevel,
    pub timestamp: f64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<(String, String)>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueAlertRule {
    pub title: String,
    #[serde(default)]
    pub settings: Option<Vec<Value>>,
}

/// `action: "triggered"` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueAlertData {
    pub event: SentryEvent,
    pub triggered_rule: String,
    #[serde(default)]
    pub issue_alert: Option<IssueAlertRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentryApp {
    pub uuid: Uuid,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInstallation {
    pub status: String,
    pub organization: Organization,
    pub app: SentryApp,
    pub code: String,
    pub uuid: Uuid,
}

/// `action: "created" | "deleted"` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationData {
    pub installation: AppInstallation,
}

/// Typed view of the `data` object.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    IssueAlert(Box<IssueAlertData>),
    Installation(InstallationData),
    /// Any other action, or a known action whose data did not fit.
    Generic,
}

impl PayloadBody {
    pub fn variant_name(&self) -> &'static str {
        match self {
            PayloadBody::IssueAlert(_) => "issue_alert",
            PayloadBody::Installation(_) => "installation",
            PayloadBody::Generic => "generic",
        }
    }
}

/// A webhook body that passed envelope validation.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub action: String,
    pub installation: Installation,
    pub actor: Option<Actor>,
    pub body: PayloadBody,
    raw: Value,
}

/// Loosely extracted event fields used by the transformer.
///
/// Unlike [`SentryEvent`] this never fails: absent or mistyped fields are
/// simply `None`, so any payload carrying `data.event` yields a view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub title: Option<String>,
    pub message: Option<String>,
    pub level: Option<String>,
    pub url: Option<String>,
    pub environment: Option<String>,
    pub release: Option<String>,
    pub project: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl WebhookPayload {
    /// Parses and validates a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validates an already-decoded JSON value.
    pub fn from_value(raw: Value) -> Result<Self, PayloadError> {
        let Some(root) = raw.as_object() else {
            return Err(PayloadError::Schema(vec![SchemaIssue::new(
                "",
                format!("Expected object, received {}", json_type(&raw)),
            )]));
        };

        let mut issues = Vec::new();
        let action = check_action(root, &mut issues);
        let installation = check_installation(root, &mut issues);
        let actor = check_actor(root, &mut issues);
        let data = check_data(root, &mut issues);

        let (Some(action), Some(installation), Some(data), true) =
            (action, installation, data, issues.is_empty())
        else {
            return Err(PayloadError::Schema(issues));
        };

        let body = classify(&action, data);
        debug!(action = %action, variant = body.variant_name(), "Classified webhook payload");

        Ok(Self {
            action,
            installation,
            actor,
            body,
            raw,
        })
    }

    /// The payload exactly as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.raw.get("data").and_then(Value::as_object)
    }

    /// Event fields, if `data.event` is set.
    ///
    /// `null`, `false`, `0` and `""` count as unset. Any other non-object
    /// value is an event without fields.
    pub fn event(&self) -> Option<EventFields> {
        let event = self.data()?.get("event").filter(|value| is_set(value))?;
        let Some(event) = event.as_object() else {
            return Some(EventFields::default());
        };

        let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_string);
        let project = match event.get("project") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let tags = event
            .get("tags")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(tag_pair).collect())
            .unwrap_or_default();

        Some(EventFields {
            title: text("title"),
            message: text("message"),
            level: text("level"),
            url: text("web_url").or_else(|| text("url")),
            environment: text("environment"),
            release: text("release"),
            project,
            tags,
        })
    }

    /// Name of the alert rule that fired, when present and non-empty.
    pub fn triggered_rule(&self) -> Option<&str> {
        self.data()?
            .get("triggered_rule")
            .and_then(Value::as_str)
            .filter(|rule| !rule.is_empty())
    }
}

impl EventFields {
    /// Folds tag pairs into a map. Later keys override earlier ones.
    pub fn tag_map(&self) -> BTreeMap<String, String> {
        self.tags.iter().cloned().collect()
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn tag_pair(entry: &Value) -> Option<(String, String)> {
    match entry {
        Value::Array(pair) if pair.len() == 2 => {
            Some((pair[0].as_str()?.to_string(), pair[1].as_str()?.to_string()))
        }
        Value::Object(obj) => Some((
            obj.get("key")?.as_str()?.to_string(),
            obj.get("value")?.as_str()?.to_string(),
        )),
        _ => None,
    }
}

fn classify(action: &str, data: &Map<String, Value>) -> PayloadBody {
    let data = Value::Object(data.clone());
    match action {
        "triggered" => match serde_json::from_value::<IssueAlertData>(data) {
            Ok(alert) => PayloadBody::IssueAlert(Box::new(alert)),
            Err(e) => {
                debug!(error = %e, "Triggered payload is not a standard issue alert");
                PayloadBody::Generic
            }
        },
        "created" | "deleted" => match serde_json::from_value::<InstallationData>(data) {
            Ok(installation) => PayloadBody::Installation(installation),
            Err(e) => {
                debug!(error = %e, "Installation payload has unexpected shape");
                PayloadBody::Generic
            }
        },
        _ => PayloadBody::Generic,
    }
}

fn check_action(root: &Map<String, Value>, issues: &mut Vec<SchemaIssue>) -> Option<String> {
    match root.get("action") {
        Some(Value::String(action)) => Some(action.clone()),
        Some(other) => {
            issues.push(expected("action", "string", other));
            None
        }
        None => {
            issues.push(SchemaIssue::new("action", "Required"));
            None
        }
    }
}

fn check_installation(
    root: &Map<String, Value>,
    issues: &mut Vec<SchemaIssue>,
) -> Option<Installation> {
    let installation = match root.get("installation") {
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            issues.push(expected("installation", "object", other));
            return None;
        }
        None => {
            issues.push(SchemaIssue::new("installation", "Required"));
            return None;
        }
    };

    match installation.get("uuid") {
        Some(Value::String(raw)) => match Uuid::parse_str(raw) {
            Ok(uuid) => Some(Installation { uuid }),
            Err(_) => {
                issues.push(SchemaIssue::new("installation.uuid", "Invalid uuid"));
                None
            }
        },
        Some(other) => {
            issues.push(expected("installation.uuid", "string", other));
            None
        }
        None => {
            issues.push(SchemaIssue::new("installation.uuid", "Required"));
            None
        }
    }
}

fn check_actor(root: &Map<String, Value>, issues: &mut Vec<SchemaIssue>) -> Option<Actor> {
    let actor = match root.get("actor") {
        None | Some(Value::Null) => return None,
        Some(Value::Object(obj)) => obj,
        Some(other) => {
            issues.push(expected("actor", "object", other));
            return None;
        }
    };

    let before = issues.len();
    match actor.get("type").and_then(Value::as_str) {
        Some("user") | Some("application") => {}
        _ => issues.push(SchemaIssue::new(
            "actor.type",
            "Invalid enum value. Expected 'user' | 'application'",
        )),
    }
    match actor.get("id") {
        Some(Value::String(_)) | Some(Value::Number(_)) => {}
        Some(other) => issues.push(expected("actor.id", "string | number", other)),
        None => issues.push(SchemaIssue::new("actor.id", "Required")),
    }
    match actor.get("name") {
        Some(Value::String(_)) => {}
        Some(other) => issues.push(expected("actor.name", "string", other)),
        None => issues.push(SchemaIssue::new("actor.name", "Required")),
    }
    if issues.len() > before {
        return None;
    }

    serde_json::from_value(Value::Object(actor.clone())).ok()
}

fn check_data<'a>(
    root: &'a Map<String, Value>,
    issues: &mut Vec<SchemaIssue>,
) -> Option<&'a Map<String, Value>> {
    match root.get("data") {
        Some(Value::Object(data)) => Some(data),
        Some(other) => {
            issues.push(expected("data", "object", other));
            None
        }
        None => {
            issues.push(SchemaIssue::new("data", "Required"));
            None
        }
    }
}

fn expected(path: &str, wanted: &str, got: &Value) -> SchemaIssue {
    SchemaIssue::new(
        path,
        format!("Expected {}, received {}", wanted, json_type(got)),
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const INSTALLATION: &str = "7a485448-a9e2-4c85-8a3c-4f44175783c9";

    fn issue_alert() -> Value {
        json!({
            "action": "triggered",
            "installation": {"uuid": INSTALLATION},
            "actor": {"type": "application", "id": "sentry", "name": "Sentry"},
            "data": {
                "event": {
                    "id": "ev1",
                    "title": "DB down",
                    "level": "fatal",
                    "timestamp": 1700000000.5,
                    "web_url": "https://sentry.io/issues/1",
                    "environment": "prod",
                    "tags": [["region", "eu"], ["service", "db"]]
                },
                "triggered_rule": "Critical errors"
            }
        })
    }

    #[test]
    fn test_issue_alert_classified() {
        let payload = WebhookPayload::from_value(issue_alert()).unwrap();
        assert_eq!(payload.action, "triggered");
        assert_eq!(payload.installation.uuid.to_string(), INSTALLATION);
        assert_eq!(payload.actor.as_ref().unwrap().kind, ActorKind::Application);

        let PayloadBody::IssueAlert(alert) = &payload.body else {
            panic!("expected issue alert, got {:?}", payload.body);
        };
        assert_eq!(alert.event.level, EventLevel::Fatal);
        assert_eq!(alert.triggered_rule, "Critical errors");
        assert_eq!(
            alert.event.tags.as_deref(),
            Some(&[("region".to_string(), "eu".to_string()), ("service".to_string(), "db".to_string())][..])
        );
    }

    #[test]
    fn test_installation_classified() {
        let payload = WebhookPayload::from_value(json!({
            "action": "created",
            "installation": {"uuid": INSTALLATION},
            "actor": {"type": "user", "id": 42, "name": "Jane"},
            "data": {
                "installation": {
                    "status": "installed",
                    "organization": {"slug": "acme"},
                    "app": {"uuid": "2c6f1f3e-1b1a-4a4d-9a3f-6a2b3c4d5e6f", "slug": "beeper"},
                    "code": "abc",
                    "uuid": INSTALLATION
                }
            }
        }))
        .unwrap();

        let PayloadBody::Installation(data) = &payload.body else {
            panic!("expected installation, got {:?}", payload.body);
        };
        assert_eq!(data.installation.organization.slug, "acme");
        assert!(matches!(
            payload.actor.unwrap().id,
            ActorId::Number(_)
        ));
    }

    #[test]
    fn test_unknown_action_falls_back_to_generic() {
        let payload = WebhookPayload::from_value(json!({
            "action": "resolved",
            "installation": {"uuid": INSTALLATION},
            "data": {"issue": {"id": "1"}}
        }))
        .unwrap();
        assert_eq!(payload.body, PayloadBody::Generic);
        assert!(payload.actor.is_none());
    }

    #[test]
    fn test_triggered_with_partial_event_is_generic() {
        let payload = WebhookPayload::from_value(json!({
            "action": "triggered",
            "installation": {"uuid": INSTALLATION},
            "data": {"event": {"title": "no level"}}
        }))
        .unwrap();
        assert_eq!(payload.body, PayloadBody::Generic);
        assert_eq!(payload.event().unwrap().title.as_deref(), Some("no level"));
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = WebhookPayload::from_value(json!({"data": []})).unwrap_err();
        let issues = err.issues();
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["action", "installation", "data"]);
        assert_eq!(issues[2].message, "Expected object, received array");
    }

    #[test]
    fn test_invalid_installation_uuid() {
        let err = WebhookPayload::from_value(json!({
            "action": "triggered",
            "installation": {"uuid": "not-a-uuid"},
            "data": {}
        }))
        .unwrap_err();
        assert_eq!(
            err.issues(),
            vec![SchemaIssue::new("installation.uuid", "Invalid uuid")]
        );
    }

    #[test]
    fn test_invalid_actor() {
        let err = WebhookPayload::from_value(json!({
            "action": "triggered",
            "installation": {"uuid": INSTALLATION},
            "actor": {"type": "robot", "id": true},
            "data": {}
        }))
        .unwrap_err();
        let paths: Vec<String> = err.issues().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["actor.type", "actor.id", "actor.name"]);
    }

    #[test]
    fn test_non_object_body() {
        let err = WebhookPayload::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.issues()[0].message, "Expected object, received array");
    }

    #[test]
    fn test_malformed_json() {
        let err = WebhookPayload::from_slice(b"{not json").unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
        assert_eq!(err.issues().len(), 1);
    }

    #[test]
    fn test_event_fields_are_lenient() {
        let payload = WebhookPayload::from_value(json!({
            "action": "error.created",
            "installation": {"uuid": INSTALLATION},
            "data": {
                "event": {
                    "title": 17,
                    "url": "https://example.com/e/1",
                    "project": 99,
                    "tags": [["a", "1"], ["broken"], {"key": "b", "value": "2"}, ["a", "3"]]
                }
            }
        }))
        .unwrap();

        let event = payload.event().unwrap();
        assert_eq!(event.title, None);
        assert_eq!(event.url.as_deref(), Some("https://example.com/e/1"));
        assert_eq!(event.project.as_deref(), Some("99"));
        let tags = event.tag_map();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["a"], "3");
        assert_eq!(tags["b"], "2");
    }

    #[test]
    fn test_web_url_preferred_over_url() {
        let mut value = issue_alert();
        value["data"]["event"]["url"] = json!("https://api.sentry.io/e/1");
        let payload = WebhookPayload::from_value(value).unwrap();
        assert_eq!(
            payload.event().unwrap().url.as_deref(),
            Some("https://sentry.io/issues/1")
        );
    }

    #[test]
    fn test_scalar_event_counts_as_event() {
        for event in [json!("boom"), json!(7), json!(true), json!([])] {
            let mut value = issue_alert();
            value["data"]["event"] = event.clone();
            let payload = WebhookPayload::from_value(value).unwrap();
            assert_eq!(payload.event(), Some(EventFields::default()), "event {}", event);
        }
    }

    #[test]
    fn test_unset_event_values() {
        for event in [json!(null), json!(false), json!(0), json!("")] {
            let mut value = issue_alert();
            value["data"]["event"] = event.clone();
            let payload = WebhookPayload::from_value(value).unwrap();
            assert_eq!(payload.event(), None, "event {}", event);
        }
    }

    #[test]
    fn test_triggered_rule_ignores_empty() {
        let mut value = issue_alert();
        assert_eq!(
            WebhookPayload::from_value(value.clone())
                .unwrap()
                .triggered_rule(),
            Some("Critical errors")
        );
        value["data"]["triggered_rule"] = json!("");
        assert_eq!(WebhookPayload::from_value(value).unwrap().triggered_rule(), None);
    }

    #[test]
    fn test_raw_is_preserved() {
        let value = issue_alert();
        let payload = WebhookPayload::from_value(value.clone()).unwrap();
        assert_eq!(payload.raw(), &value);
    }
}
