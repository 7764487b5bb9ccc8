//! Broker messaging for relayed alerts.
//!
//! This module separates *how bytes reach the broker* from *what happens
//! when the broker is unavailable*:
//!
//! - [`BrokerTransport`] is a thin trait over one broker session: connect,
//!   publish, disconnect. [`MqttTransport`] implements it with `rumqttc`,
//!   [`MockBroker`] implements it in memory for tests and local runs.
//! - [`ConnectionManager`] owns the lifecycle on top of a transport: the
//!   `Disconnected → Connecting → Connected` state machine, exponential
//!   backoff reconnects after a drop and a bounded FIFO queue of messages
//!   published while the link is down.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use br_core::messaging::{
//!     ConnectionManager, ConnectionManagerConfig, MqttTransport, MqttTransportConfig,
//!     PublishOptions, QoS,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MqttTransport::new(MqttTransportConfig::new("mqtt://localhost:1883"))?;
//! let manager = ConnectionManager::new(Arc::new(transport), ConnectionManagerConfig::default());
//!
//! manager.connect().await?;
//! manager
//!     .publish("alerts/high/triggered", b"{}".to_vec(), PublishOptions::new(QoS::AtLeastOnce))
//!     .await;
//! manager.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
pub mod manager;
pub mod mock;
pub mod mqtt;
pub mod topic;
pub mod types;

pub use backoff::ReconnectPolicy;
pub use error::{BrokerError, BrokerResult};
pub use manager::{ConnectionManager, ConnectionManagerConfig};
pub use mock::{MockBroker, PublishedMessage};
pub use mqtt::{MqttTransport, MqttTransportConfig};
pub use topic::{topic_matches, TopicBuilder, TopicPolicy};
pub use types::{
    ConnectionState, ConnectionStatus, LinkEvent, LinkMonitor, PublishOptions, PublishOutcome,
    QoS, QueuedMessage,
};

use async_trait::async_trait;

/// One broker session at a time.
///
/// Implementations do not retry or queue; that is the
/// [`ConnectionManager`]'s job. A call to [`connect`](Self::connect) replaces
/// any previous session.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Opens a session and waits until the broker accepts it.
    ///
    /// The returned [`LinkMonitor`] yields [`LinkEvent::Lost`] (or closes)
    /// when the session ends without [`disconnect`](Self::disconnect) being
    /// called.
    async fn connect(&self) -> BrokerResult<LinkMonitor>;

    /// Publishes on the current session.
    async fn publish(&self, topic: &str, payload: &[u8], options: PublishOptions)
        -> BrokerResult<()>;

    /// Closes the current session cleanly. A no-op when there is none.
    async fn disconnect(&self) -> BrokerResult<()>;

    /// Broker address, for status reporting.
    fn broker_url(&self) -> &str;

    /// Client identifier presented to the broker.
    fn client_id(&self) -> &str;
}
