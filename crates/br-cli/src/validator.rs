//! Configuration validation for Beeper Relay.
//!
//! Runs before the server starts so that a bad broker URL or log level is
//! reported up front instead of surfacing as a connect failure.

use crate::config::AppConfig;
use br_core::messaging::mqtt::BrokerAddress;
use colored::Colorize;
use serde::Serialize;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const BROKER_SCHEMES: &[&str] = &["mqtt", "mqtts", "tcp", "ssl"];

/// Result of configuration validation.
#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    /// Critical errors that prevent startup.
    pub errors: Vec<String>,
    /// Warnings that should be addressed but don't prevent startup.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Configuration Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Configuration Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration OK", "✓".green());
        }
    }
}

/// Validates application configuration before startup.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the application configuration.
    pub fn validate(config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_broker(config, &mut result);
        Self::validate_topics(config, &mut result);
        Self::validate_sentry(config, &mut result);
        Self::validate_server(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_broker(config: &AppConfig, result: &mut ValidationResult) {
        let mqtt = &config.mqtt;

        match mqtt.broker_url.split_once("://") {
            Some((scheme, _)) if BROKER_SCHEMES.contains(&scheme.to_lowercase().as_str()) => {
                if let Err(e) = BrokerAddress::parse(&mqtt.broker_url) {
                    result.add_error(format!("Invalid broker URL '{}': {}", mqtt.broker_url, e));
                }
            }
            _ => result.add_error(format!(
                "Invalid broker URL '{}'. Expected {}://host[:port]",
                mqtt.broker_url,
                BROKER_SCHEMES.join("|")
            )),
        }

        if mqtt.qos > 2 {
            result.add_error(format!("Invalid QoS {}. Must be 0, 1 or 2", mqtt.qos));
        }

        if mqtt.client_id.trim().is_empty() {
            result.add_error("MQTT client id must not be empty");
        }

        if mqtt.password.is_some() && mqtt.username.is_none() {
            result.add_warning("MQTT password is set without a username and will be ignored");
        }

        if mqtt.reconnect.max_attempts == 0 {
            result.add_warning(
                "reconnect.max_attempts is 0. The relay will not reconnect after a broker drop",
            );
        }

        if mqtt.publish_timeout_secs == 0 {
            result.add_error("mqtt.publish_timeout_secs must be greater than 0");
        }

        if mqtt.max_queued_messages == 0 {
            result.add_warning(
                "max_queued_messages is 0. Alerts received during broker outages are dropped",
            );
        }
    }

    fn validate_topics(config: &AppConfig, result: &mut ValidationResult) {
        let prefix = config.mqtt.topic_prefix.trim_end_matches('/');

        if prefix.is_empty() {
            result.add_error("MQTT topic prefix must not be empty");
        } else if prefix.contains(['+', '#']) {
            result.add_error(format!(
                "MQTT topic prefix '{}' must not contain wildcards (+ or #)",
                prefix
            ));
        }
    }

    fn validate_sentry(config: &AppConfig, result: &mut ValidationResult) {
        let secret_missing = config
            .sentry
            .webhook_secret
            .as_deref()
            .map_or(true, |s| s.is_empty());

        if secret_missing {
            if config.server.environment.is_production() {
                result.add_warning(
                    "SENTRY_WEBHOOK_SECRET is not set. Webhook signatures will NOT be verified \
                     in production",
                );
            } else {
                result.add_warning("SENTRY_WEBHOOK_SECRET is not set. Signature checks disabled");
            }
        }

        if let Err(e) = config.allowlist() {
            result.add_error(format!("{:#}", e));
        }

        if config.sentry.timestamp_tolerance_secs == 0 {
            result.add_error("sentry.timestamp_tolerance_secs must be greater than 0");
        }
    }

    fn validate_server(config: &AppConfig, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error("Server port must not be 0");
        }
        if let Err(e) = config.bind_address() {
            result.add_error(format!("{:#}", e));
        }
    }

    fn validate_logging(config: &AppConfig, result: &mut ValidationResult) {
        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            result.add_error(format!(
                "Invalid log level '{}'. Must be one of: {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
    }
}
