//! Beeper Relay CLI
//!
//! Runs the Sentry-to-MQTT relay and offers a few operator commands
//! against a running instance or its broker.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

mod api_client;
mod commands;
mod config;
mod validator;

use api_client::ApiClient;
use br_observability::logging::LoggingConfig;
use commands::{run_server, watch_alerts, ServeOptions, WatchOptions};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "beeper-relay")]
#[command(version)]
#[command(about = "Relays Sentry webhook alerts to MQTT for beeper devices", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BEEPER_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Relay service URL (for status and send-test)
    #[arg(long, default_value = "http://localhost:3000")]
    service_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and start the webhook server
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides config and HOST)
        #[arg(long)]
        host: Option<String>,

        /// Use an in-memory broker instead of MQTT
        #[arg(long)]
        mock_broker: bool,

        /// Validate configuration and exit without starting the server
        #[arg(long)]
        validate_only: bool,
    },

    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },

    /// Show the health of a running relay
    Status,

    /// Post a signed sample webhook to a running relay
    SendTest {
        /// Value of the sentry-hook-resource header
        #[arg(short, long, default_value = "event_alert")]
        resource: String,

        /// Event level (debug, info, warning, error, fatal)
        #[arg(short, long, default_value = "error")]
        level: String,

        /// Event title
        #[arg(short, long, default_value = "Test alert from beeper-relay")]
        title: String,
    },

    /// Print alerts as they are published to the broker
    Watch {
        /// Stop after this many alerts
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = AppConfig::resolve(&config_path)?;

    init_logging(&cli, &config);

    match cli.command {
        Commands::Serve {
            port,
            host,
            mock_broker,
            validate_only,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            cmd_serve(config, ServeOptions { mock_broker }, validate_only).await
        }
        Commands::Validate { config: cfg_path } => {
            cmd_validate(cfg_path.unwrap_or(config_path), cli.format).await
        }
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format).await,
        Commands::Status => cmd_status(&cli.service_url, cli.format).await,
        Commands::SendTest {
            resource,
            level,
            title,
        } => cmd_send_test(&config, &cli.service_url, &resource, &level, &title, cli.format).await,
        Commands::Watch { limit } => {
            watch_alerts(
                &config,
                WatchOptions {
                    json: cli.format == OutputFormat::Json,
                    limit,
                },
            )
            .await
        }
    }
}

fn init_logging(cli: &Cli, config: &AppConfig) {
    let base = if config.server.environment.is_production() {
        LoggingConfig::production()
    } else {
        LoggingConfig::default()
    };

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let logging = base
        .clone()
        .with_level_name(level)
        .unwrap_or(base)
        .with_json(config.logging.json || cli.format == OutputFormat::Json);

    br_observability::init_logging_with_config(logging);
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("com", "beeper-relay", "beeper-relay") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/default.yaml")
    }
}

async fn cmd_serve(config: AppConfig, options: ServeOptions, validate_only: bool) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    if validate_only {
        if validation_result.has_errors() {
            println!();
            println!(
                "{}",
                "Configuration validation failed. Fix the errors above before starting the server."
                    .red()
                    .bold()
            );
            std::process::exit(1);
        } else {
            println!();
            println!(
                "{}",
                "Configuration is valid. Server can be started."
                    .green()
                    .bold()
            );
            return Ok(());
        }
    }

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Server startup aborted due to configuration errors. Fix the errors above and try again."
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    println!();
    run_server(config, options).await
}

async fn cmd_validate(config_path: PathBuf, format: OutputFormat) -> Result<()> {
    let mut config = if config_path.exists() {
        match AppConfig::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                println!("{}: {:#}", "Configuration file error".red().bold(), e);
                std::process::exit(1);
            }
        }
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides(|key| std::env::var(key).ok())?;

    let validation_result = ConfigValidator::validate(&config);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&validation_result)?);
        if validation_result.has_errors() {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );
    if !config_path.exists() {
        println!("  (file not found, using defaults and environment)");
    }
    validation_result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Environment: {}", config.server.environment);
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Broker: {}", config.redact_secrets().mqtt.broker_url);
    println!(
        "  Topics: {}/# ({})",
        config.mqtt.topic_prefix.trim_end_matches('/'),
        config.mqtt.topic_policy
    );
    println!("  QoS: {}", config.mqtt.qos);
    println!("  Priority: {}", config.priority);
    println!(
        "  Allowed IPs: {}",
        if config.sentry.allowed_ips.is_empty() {
            "any".to_string()
        } else {
            config.sentry.allowed_ips.join(", ")
        }
    );
    if !config.sentry.trusted_proxies.is_empty() {
        println!(
            "  Trusted proxies: {}",
            config.sentry.trusted_proxies.join(", ")
        );
    }

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if !validation_result.warnings.is_empty() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

async fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        print!("{}", serde_yaml::to_string(&display_config)?);
    }

    Ok(())
}

async fn cmd_status(service_url: &str, format: OutputFormat) -> Result<()> {
    let client = ApiClient::new(service_url)?;

    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => {
            println!("{}: {:#}", "Error".red(), e);
            println!("Make sure the relay is running (beeper-relay serve)");
            std::process::exit(1);
        }
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let status = if health.status == "ok" {
        health.status.green()
    } else {
        health.status.yellow()
    };
    let connected = if health.mqtt.connected {
        "yes".green()
    } else {
        "no".red()
    };

    println!("{}", "Beeper Relay Status".bold());
    println!("─────────────────────");
    println!("  {} {}", "Status:".cyan(), status);
    println!("  {} {}", "Version:".cyan(), health.version);
    println!("  {} {}", "Environment:".cyan(), health.environment);
    println!("  {} {}s", "Uptime:".cyan(), health.uptime / 1000);
    println!();
    println!("{}", "Broker".bold());
    println!("  {} {}", "URL:".cyan(), health.mqtt.broker_url);
    println!("  {} {}", "Client id:".cyan(), health.mqtt.client_id);
    println!("  {} {}", "Connected:".cyan(), connected);
    println!(
        "  {} {}",
        "Reconnect attempts:".cyan(),
        health.mqtt.reconnect_attempts
    );
    println!("  {} {}", "Queued messages:".cyan(), health.mqtt.queued_messages);

    Ok(())
}

async fn cmd_send_test(
    config: &AppConfig,
    service_url: &str,
    resource: &str,
    level: &str,
    title: &str,
    format: OutputFormat,
) -> Result<()> {
    let client = ApiClient::new(service_url)?;
    let body = serde_json::to_vec(&sample_payload(title, level))?;

    let response = client
        .send_webhook(resource, body, config.sentry.webhook_secret.as_deref())
        .await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!(
            "{} {} (request {})",
            "✓".green(),
            response.message,
            response.request_id.cyan()
        );
    }

    Ok(())
}

/// An issue alert shaped like the ones Sentry sends for alert rules.
fn sample_payload(title: &str, level: &str) -> serde_json::Value {
    let now = chrono::Utc::now();
    json!({
        "action": "triggered",
        "installation": {"uuid": uuid::Uuid::new_v4()},
        "actor": {"type": "application", "id": "sentry", "name": "Sentry"},
        "data": {
            "event": {
                "id": uuid::Uuid::new_v4().simple().to_string(),
                "title": title,
                "level": level,
                "timestamp": now.timestamp(),
                "message": "Sample event sent by beeper-relay send-test",
                "environment": "test",
                "platform": "other",
                "tags": [["source", "beeper-relay"]]
            },
            "triggered_rule": "beeper-relay send-test"
        }
    })
}
