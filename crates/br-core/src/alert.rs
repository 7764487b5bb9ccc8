//! Normalized alert message relayed to the broker.
//!
//! Every accepted webhook, whatever its shape, becomes exactly one
//! [`NormalizedAlertMessage`]. Downstream beepers only ever see this type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Provider tag stamped on every message and used as the id prefix.
pub const ALERT_SOURCE: &str = "sentry";

/// Urgency of an alert as seen by the beeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational, no page
    Low,
    /// Default when nothing better is known
    Medium,
    /// Errors that need attention
    High,
    /// Fatal events, page immediately
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Maps a provider event level onto a priority.
    ///
    /// `None` means the payload carried no event at all, which is treated as
    /// a medium-priority notification. Unknown levels fall through to low.
    pub fn from_event_level(level: Option<&str>) -> Self {
        match level {
            None => Priority::Medium,
            Some("fatal") => Priority::Critical,
            Some("error") => Priority::High,
            Some("warning") => Priority::Medium,
            Some(_) => Priority::Low,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// How priorities are assigned to outgoing messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PriorityPolicy {
    /// Derive priority from the event level.
    #[default]
    Severity,
    /// Every message gets the same priority.
    Fixed {
        #[serde(default = "default_fixed_priority")]
        level: Priority,
    },
}

fn default_fixed_priority() -> Priority {
    Priority::High
}

impl PriorityPolicy {
    pub fn resolve(&self, event_level: Option<&str>) -> Priority {
        match self {
            PriorityPolicy::Severity => Priority::from_event_level(event_level),
            PriorityPolicy::Fixed { level } => *level,
        }
    }
}

impl fmt::Display for PriorityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityPolicy::Severity => f.write_str("severity"),
            PriorityPolicy::Fixed { level } => write!(f, "fixed:{}", level),
        }
    }
}

/// Parses `severity`, `fixed` or `fixed:<priority>`.
impl FromStr for PriorityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.split_once(':') {
            None if s == "severity" => Ok(PriorityPolicy::Severity),
            None if s == "fixed" => Ok(PriorityPolicy::Fixed {
                level: default_fixed_priority(),
            }),
            Some(("fixed", level)) => Ok(PriorityPolicy::Fixed {
                level: level.parse()?,
            }),
            _ => Err(format!(
                "unknown priority policy '{}', expected 'severity' or 'fixed[:level]'",
                s
            )),
        }
    }
}

/// Human-facing fields extracted from the provider payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertData {
    pub title: String,
    pub message: String,
    pub level: String,
    pub url: String,
    pub environment: String,
    pub release: String,
    pub project: String,
    pub tags: BTreeMap<String, String>,
}

/// The canonical unit published to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAlertMessage {
    /// `<source>_<epochMillis>_<suffix>`
    pub id: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: Priority,
    pub data: AlertData,
    /// The validated payload exactly as received.
    pub raw: serde_json::Value,
}

impl NormalizedAlertMessage {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// RFC 3339 timestamps with millisecond precision and a `Z` suffix.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
