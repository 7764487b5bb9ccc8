//! Types shared by the broker transport and the connection manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// MQTT delivery guarantee.
///
/// Serialized as the numeric level (`0`, `1`, `2`) so config files and env
/// vars can use the familiar form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("invalid QoS level {}, expected 0, 1 or 2", other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Per-message publish settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    pub fn new(qos: QoS) -> Self {
        Self { qos, retain: false }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// A message held back while the broker link is down.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub options: PublishOptions,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, options: PublishOptions) -> Self {
        Self {
            topic: topic.into(),
            payload,
            options,
            enqueued_at: Utc::now(),
        }
    }
}

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Point-in-time view of the connection manager, reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub queued_messages: usize,
    pub broker_url: String,
    pub client_id: String,
}

/// Result of handing a message to the connection manager.
///
/// Publishing never fails from the caller's point of view; this only tells
/// what happened to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the broker client.
    Sent,
    /// Held in the outage queue until the next successful connect.
    Queued,
    /// The broker client rejected it while connected. Logged and dropped.
    Failed,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::Sent => "sent",
            PublishOutcome::Queued => "queued",
            PublishOutcome::Failed => "failed",
        }
    }
}

/// Notifications from a live broker session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The session ended without being asked to.
    Lost { reason: String },
}

/// Receiving side of a session's [`LinkEvent`] channel.
///
/// Returned by [`BrokerTransport::connect`](super::BrokerTransport::connect).
/// When the sender is dropped without an event the session is over as well.
pub struct LinkMonitor {
    receiver: mpsc::Receiver<LinkEvent>,
}

impl LinkMonitor {
    pub fn new(receiver: mpsc::Receiver<LinkEvent>) -> Self {
        Self { receiver }
    }

    /// Creates a connected sender/monitor pair.
    pub fn channel() -> (mpsc::Sender<LinkEvent>, Self) {
        let (tx, rx) = mpsc::channel(4);
        (tx, Self::new(rx))
    }

    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for LinkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkMonitor")
            .field("receiver", &"<mpsc::Receiver>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_levels() {
        assert_eq!(QoS::try_from(0), Ok(QoS::AtMostOnce));
        assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
        assert!(QoS::try_from(3).is_err());
        assert_eq!(QoS::default().level(), 1);
    }

    #[test]
    fn test_qos_serde_as_number() {
        let qos: QoS = serde_json::from_str("2").unwrap();
        assert_eq!(qos, QoS::ExactlyOnce);
        assert_eq!(serde_json::to_string(&QoS::AtMostOnce).unwrap(), "0");
        assert!(serde_json::from_str::<QoS>("7").is_err());
    }

    #[test]
    fn test_connection_state_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = ConnectionStatus {
            connected: true,
            reconnect_attempts: 2,
            queued_messages: 5,
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "beeper-service".to_string(),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["reconnectAttempts"], 2);
        assert_eq!(value["queuedMessages"], 5);
        assert_eq!(value["brokerUrl"], "mqtt://localhost:1883");
        assert_eq!(value["clientId"], "beeper-service");
    }

    #[tokio::test]
    async fn test_link_monitor_sees_sender_drop() {
        let (tx, mut monitor) = LinkMonitor::channel();
        tx.send(LinkEvent::Lost {
            reason: "eof".to_string(),
        })
        .await
        .unwrap();
        drop(tx);

        assert_eq!(
            monitor.recv().await,
            Some(LinkEvent::Lost {
                reason: "eof".to_string()
            })
        );
        assert_eq!(monitor.recv().await, None);
    }
}
