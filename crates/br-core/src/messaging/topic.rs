//! Topic naming for relayed alerts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::alert::Priority;

/// Shape of the topic each alert is published to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPolicy {
    /// `<prefix>/<priority>/<type>`
    #[default]
    Hierarchical,
    /// `<prefix>`
    PrefixOnly,
}

impl fmt::Display for TopicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPolicy::Hierarchical => f.write_str("hierarchical"),
            TopicPolicy::PrefixOnly => f.write_str("prefix_only"),
        }
    }
}

impl FromStr for TopicPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "hierarchical" => Ok(TopicPolicy::Hierarchical),
            "prefix_only" | "prefix" | "flat" => Ok(TopicPolicy::PrefixOnly),
            other => Err(format!(
                "unknown topic policy '{}', expected 'hierarchical' or 'prefix_only'",
                other
            )),
        }
    }
}

/// Builds publish topics and the matching subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    prefix: String,
    policy: TopicPolicy,
}

impl TopicBuilder {
    pub fn new(prefix: impl Into<String>, policy: TopicPolicy) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            policy,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy(&self) -> TopicPolicy {
        self.policy
    }

    pub fn topic_for(&self, priority: Priority, kind: &str) -> String {
        match self.policy {
            TopicPolicy::Hierarchical => {
                format!("{}/{}/{}", self.prefix, priority, sanitize_level(kind))
            }
            TopicPolicy::PrefixOnly => self.prefix.clone(),
        }
    }

    /// Filter that matches every topic this builder can produce.
    pub fn subscription_filter(&self) -> String {
        format!("{}/#", self.prefix)
    }
}

/// MQTT reserves `+`, `#` and `/` inside a level; an action name must not
/// change the topic shape.
fn sanitize_level(level: &str) -> String {
    let cleaned: String = level
        .chars()
        .map(|c| match c {
            '+' | '#' | '/' | '\0' => '_',
            other => other,
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// Returns true if `filter` (which may contain `+`/`#`) matches `topic`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
