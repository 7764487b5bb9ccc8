//! Error types for broker operations.
//!
//! Returned by [`BrokerTransport`](super::BrokerTransport) implementations and
//! by [`ConnectionManager::connect`](super::ConnectionManager::connect).

use thiserror::Error;

/// Errors that can occur while talking to the message broker.
///
/// Transient errors (connection, timeout, not connected) are handled by the
/// connection manager's reconnect loop. The rest indicate a problem with the
/// configuration or the data and will not go away on retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Failed to establish or keep the broker connection.
    ///
    /// Covers DNS failures, refused TCP connections, TLS handshake failures
    /// and CONNACK rejections (bad credentials, unauthorized client id).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker did not answer in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A publish was attempted without an open session.
    #[error("Not connected to broker")]
    NotConnected,

    /// The broker client refused the publish request.
    #[error("Publish error: {0}")]
    Publish(String),

    /// Message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Broker URL or client options are invalid.
    #[error("Invalid broker configuration: {0}")]
    Configuration(String),

    /// The manager has been shut down and will not connect again.
    #[error("Connection manager is shut down")]
    ShutDown,
}

impl BrokerError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns `true` if a later attempt could succeed without any change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::NotConnected | Self::Publish(_)
        )
    }

    /// Returns the error kind as a static string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::NotConnected => "not_connected",
            Self::Publish(_) => "publish",
            Self::Serialization(_) => "serialization",
            Self::Configuration(_) => "configuration",
            Self::ShutDown => "shut_down",
        }
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
