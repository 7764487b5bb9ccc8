//! Watch command - subscribes to relayed alerts and prints them.

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Transport};
use std::time::Duration;

use br_core::messaging::mqtt::BrokerAddress;
use br_core::{NormalizedAlertMessage, Priority, QoS, TopicBuilder};

use crate::config::AppConfig;

/// How to print received alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// One JSON document per line instead of a summary.
    pub json: bool,
    /// Stop after this many alerts.
    pub limit: Option<usize>,
}

/// Subscribes to `<prefix>/#` and prints every alert until Ctrl+C.
pub async fn watch_alerts(config: &AppConfig, options: WatchOptions) -> Result<()> {
    let address = BrokerAddress::parse(&config.mqtt.broker_url)
        .with_context(|| format!("Invalid broker URL '{}'", config.mqtt.broker_url))?;
    let filter = TopicBuilder::new(config.mqtt.topic_prefix.clone(), config.mqtt.topic_policy)
        .subscription_filter();

    let client_id = format!("{}-watch-{}", config.mqtt.client_id, std::process::id());
    let mut opts = MqttOptions::new(client_id, address.host.clone(), address.port);
    opts.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive_secs));
    opts.set_clean_session(true);

    let username = config.mqtt.username.clone().or(address.username.clone());
    let password = config.mqtt.password.clone().or(address.password.clone());
    if let Some(username) = username {
        opts.set_credentials(username, password.unwrap_or_default());
    }
    if address.tls {
        opts.set_transport(Transport::tls_with_default_config());
    }

    let (client, mut eventloop) = AsyncClient::new(opts, 16);
    let qos: rumqttc::QoS = config.qos().unwrap_or(QoS::AtLeastOnce).into();
    client
        .subscribe(filter.clone(), qos)
        .await
        .context("Failed to queue subscription")?;

    eprintln!(
        "{} Watching {} on {}:{} (Ctrl+C to stop)",
        "[watch]".cyan(),
        filter.bold(),
        address.host,
        address.port
    );

    let mut received = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = eventloop.poll() => {
                match event.context("Lost connection to MQTT broker")? {
                    Event::Incoming(Packet::Publish(publish)) => {
                        print_alert(&publish.topic, &publish.payload, options.json);
                        received += 1;
                        if options.limit.is_some_and(|limit| received >= limit) {
                            break;
                        }
                    }
                    Event::Incoming(Packet::SubAck(_)) => {
                        eprintln!("  {} Subscribed", "✓".green());
                    }
                    _ => {}
                }
            }
        }
    }

    client.disconnect().await.ok();
    eprintln!("{} {} alert(s) received", "[watch]".cyan(), received);
    Ok(())
}

fn print_alert(topic: &str, payload: &[u8], json: bool) {
    if json {
        println!("{}", String::from_utf8_lossy(payload));
        return;
    }

    match serde_json::from_slice::<NormalizedAlertMessage>(payload) {
        Ok(alert) => {
            println!(
                "{} {} {} {}",
                alert.timestamp.format("%H:%M:%S").to_string().dimmed(),
                priority_badge(alert.priority),
                alert.data.title.bold(),
                format!("[{}]", topic).dimmed()
            );
            if !alert.data.message.is_empty() {
                println!("    {}", alert.data.message);
            }
            if !alert.data.url.is_empty() {
                println!("    {}", alert.data.url.underline());
            }
        }
        Err(_) => println!(
            "{} {}",
            format!("[{}]", topic).dimmed(),
            String::from_utf8_lossy(payload)
        ),
    }
}

fn priority_badge(priority: Priority) -> ColoredString {
    let label = format!("{:<8}", priority.as_str().to_uppercase());
    match priority {
        Priority::Critical => label.white().on_red().bold(),
        Priority::High => label.red().bold(),
        Priority::Medium => label.yellow(),
        Priority::Low => label.blue(),
    }
}
