//! # br-core
//!
//! Core data model and relay machinery for Beeper Relay.
//!
//! This crate owns the normalized alert message, the Sentry payload model,
//! the payload-to-alert transformer and the broker connection manager that
//! queues messages while the MQTT link is down.

pub mod alert;
pub mod environment;
pub mod messaging;
pub mod payload;
pub mod relay;
pub mod transform;

pub use alert::{AlertData, NormalizedAlertMessage, Priority, PriorityPolicy, ALERT_SOURCE};
pub use environment::Environment;
pub use messaging::{
    BrokerError, BrokerTransport, ConnectionManager, ConnectionManagerConfig, ConnectionState,
    ConnectionStatus, MockBroker, MqttTransport, MqttTransportConfig, PublishOptions,
    PublishOutcome, QoS, ReconnectPolicy, TopicBuilder, TopicPolicy,
};
pub use payload::{PayloadError, SchemaIssue, WebhookPayload};
pub use relay::{AlertRelay, RelayReceipt};
pub use transform::AlertTransformer;
