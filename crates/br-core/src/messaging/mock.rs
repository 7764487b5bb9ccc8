//! In-memory broker for testing.
//!
//! [`MockBroker`] implements [`BrokerTransport`] without any network. It
//! records every publish and lets a test decide whether the broker is
//! reachable, whether it rejects publishes, and when an open session drops.
//! Used by:
//!
//! - Connection manager unit tests (queueing, flush order, backoff timing)
//! - HTTP integration tests that assert what was relayed
//! - `serve --mock-broker` for local development without Mosquitto

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::error::{BrokerError, BrokerResult};
use super::types::{LinkEvent, LinkMonitor, PublishOptions};
use super::BrokerTransport;

const MOCK_BROKER_URL: &str = "mqtt://mock-broker:1883";
const MOCK_CLIENT_ID: &str = "beeper-service";

/// A message captured by [`MockBroker`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub options: PublishOptions,
    pub published_at: DateTime<Utc>,
}

impl PublishedMessage {
    /// Decodes the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[derive(Debug)]
struct MockState {
    reachable: bool,
    reject_publishes: bool,
    link: Option<mpsc::Sender<LinkEvent>>,
    published: Vec<PublishedMessage>,
    connect_times: Vec<Instant>,
}

/// In-memory implementation of [`BrokerTransport`].
///
/// `MockBroker` is `Send + Sync`; share it as `Arc<MockBroker>` between the
/// connection manager and the test body.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use br_core::messaging::{ConnectionManager, ConnectionManagerConfig, MockBroker, PublishOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = Arc::new(MockBroker::new());
/// let manager = ConnectionManager::new(broker.clone(), ConnectionManagerConfig::default());
///
/// manager.connect().await?;
/// manager.publish("alerts", b"hi".to_vec(), PublishOptions::default()).await;
///
/// assert_eq!(broker.published_topics().await, vec!["alerts".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBroker {
    broker_url: String,
    client_id: String,
    state: RwLock<MockState>,
    connect_attempts: AtomicU32,
    disconnects: AtomicU32,
}

impl MockBroker {
    /// Creates a reachable mock broker.
    pub fn new() -> Self {
        Self::with_endpoint(MOCK_BROKER_URL, MOCK_CLIENT_ID)
    }

    /// Creates a mock broker that reports the given address in status output.
    pub fn with_endpoint(broker_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::build(broker_url.into(), client_id.into(), true)
    }

    /// Creates a mock broker whose connects fail until made reachable.
    pub fn unreachable() -> Self {
        Self::build(MOCK_BROKER_URL.to_string(), MOCK_CLIENT_ID.to_string(), false)
    }

    fn build(broker_url: String, client_id: String, reachable: bool) -> Self {
        Self {
            broker_url,
            client_id,
            state: RwLock::new(MockState {
                reachable,
                reject_publishes: false,
                link: None,
                published: Vec::new(),
                connect_times: Vec::new(),
            }),
            connect_attempts: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
        }
    }

    /// Controls whether subsequent connects succeed.
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.write().await.reachable = reachable;
    }

    /// Controls whether publishes on an open session fail.
    pub async fn set_reject_publishes(&self, reject: bool) {
        self.state.write().await.reject_publishes = reject;
    }

    /// Ends the open session as if the network dropped.
    ///
    /// Returns `false` if there was no session to drop.
    pub async fn drop_connection(&self, reason: &str) -> bool {
        let link = self.state.write().await.link.take();
        match link {
            Some(link) => {
                debug!(reason = reason, "Mock broker dropping connection");
                let _ = link
                    .send(LinkEvent::Lost {
                        reason: reason.to_string(),
                    })
                    .await;
                true
            }
            None => false,
        }
    }

    pub async fn is_session_open(&self) -> bool {
        self.state.read().await.link.is_some()
    }

    /// All messages accepted so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().await.published.clone()
    }

    pub async fn published_topics(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .published
            .iter()
            .map(|m| m.topic.clone())
            .collect()
    }

    pub async fn clear_published(&self) {
        self.state.write().await.published.clear();
    }

    /// Number of connect calls, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// When each connect call happened, on the Tokio clock.
    pub async fn connect_times(&self) -> Vec<Instant> {
        self.state.read().await.connect_times.clone()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerTransport for MockBroker {
    async fn connect(&self) -> BrokerResult<LinkMonitor> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.connect_times.push(Instant::now());

        if !state.reachable {
            return Err(BrokerError::connection("mock broker is unreachable"));
        }

        let (tx, monitor) = LinkMonitor::channel();
        // Replacing the sender closes any previous session's monitor.
        state.link = Some(tx);
        trace!("Mock broker session opened");
        Ok(monitor)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> BrokerResult<()> {
        let mut state = self.state.write().await;
        if state.link.is_none() {
            return Err(BrokerError::NotConnected);
        }
        if state.reject_publishes {
            return Err(BrokerError::publish("mock broker rejected publish"));
        }

        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            options,
            published_at: Utc::now(),
        });
        trace!(topic = topic, bytes = payload.len(), "Mock broker accepted publish");
        Ok(())
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.write().await.link = None;
        Ok(())
    }

    fn broker_url(&self) -> &str {
        &self.broker_url
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}
