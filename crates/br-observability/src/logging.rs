//! Logging infrastructure for Beeper Relay.
//!
//! This module provides structured logging using the tracing ecosystem.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Crates whose logs are enabled at the configured level.
const LOG_TARGETS: &[&str] = &["br_core", "br_api", "br_observability", "beeper_relay"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: Level,
    /// Whether to use JSON format.
    pub json_format: bool,
    /// Whether to include span events.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include thread IDs.
    pub include_thread_ids: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
    /// Level for HTTP plumbing (`tower_http`, `hyper`).
    pub http_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
            http_level: Level::WARN,
        }
    }
}

impl LoggingConfig {
    /// Creates a development configuration with more verbose output.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            json_format: false,
            include_spans: true,
            include_location: true,
            include_thread_ids: true,
            include_target: true,
            http_level: Level::DEBUG,
        }
    }

    /// Creates a production configuration with JSON output.
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            json_format: true,
            include_spans: false,
            include_location: false,
            include_thread_ids: false,
            include_target: true,
            http_level: Level::WARN,
        }
    }

    /// Overrides the level from a name such as `warn` or `debug`.
    pub fn with_level_name(mut self, name: &str) -> Result<Self, String> {
        self.level = parse_level(name)?;
        Ok(self)
    }

    pub fn with_json(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }

    /// Filter directives used when `RUST_LOG` is not set.
    pub fn filter_directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        let http = self.http_level.as_str().to_lowercase();
        let mut directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect();
        directives.push(format!("tower_http={}", http));
        directives.push(format!("hyper={}", http));
        directives.push("rumqttc=warn".to_string());
        directives.join(",")
    }
}

/// Parses a log level name. Accepts the usual five plus `warning`.
pub fn parse_level(name: &str) -> Result<Level, String> {
    match name.trim().to_lowercase().as_str() {
        "warning" => Ok(Level::WARN),
        other => Level::from_str(other).map_err(|_| {
            format!(
                "invalid log level '{}', expected error, warn, info, debug or trace",
                name
            )
        }),
    }
}

/// Initializes the logging system with default configuration.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::default());
}

/// Initializes the logging system with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured levels.
pub fn init_logging_with_config(config: LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_target(config.include_target);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

/// Creates a span for one inbound webhook.
#[macro_export]
macro_rules! webhook_span {
    ($request_id:expr) => {
        tracing::info_span!("webhook", request_id = %$request_id)
    };
    ($request_id:expr, $($field:tt)*) => {
        tracing::info_span!("webhook", request_id = %$request_id, $($field)*)
    };
}
