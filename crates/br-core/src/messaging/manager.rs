//! Broker connection lifecycle, reconnection and outage queueing.
//!
//! [`ConnectionManager`] is a cheap-to-clone handle. All clones share one
//! state machine:
//!
//! ```text
//!  Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!       ▲                          │                  │
//!       └──────────err─────────────┘       link lost  │
//!       ◀──────────────────────────────────────────────┘
//! ```
//!
//! State and queue sit behind one async mutex. `publish` holds it while
//! sending and the post-connect flush holds it while draining, so a message
//! published after a reconnect can never overtake one queued during the
//! outage. Every transport send is bounded by `publish_timeout`, so a stalled
//! broker client cannot hold the lock indefinitely. Counters for
//! [`status`](ConnectionManager::status) are mirrored into atomics so health
//! checks never wait on a slow publish.

use metrics::{counter, gauge};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectPolicy;
use super::error::{BrokerError, BrokerResult};
use super::types::{
    ConnectionState, ConnectionStatus, LinkEvent, LinkMonitor, PublishOptions, PublishOutcome,
    QueuedMessage,
};
use super::BrokerTransport;

/// Default bound on messages held during an outage.
pub const DEFAULT_MAX_QUEUED_MESSAGES: usize = 1000;

/// Default upper bound on a single transport publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionManagerConfig {
    pub reconnect: ReconnectPolicy,
    /// Oldest messages are dropped once this many are waiting.
    pub max_queued_messages: usize,
    /// A transport publish still pending after this long counts as failed
    /// and releases the manager lock.
    pub publish_timeout: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            max_queued_messages: DEFAULT_MAX_QUEUED_MESSAGES,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

struct ManagerState {
    connection: ConnectionState,
    /// Bumped on every successful connect so stale link watchers can tell
    /// they belong to an old session.
    session: u64,
    reconnecting: bool,
    queue: VecDeque<QueuedMessage>,
}

struct Inner {
    transport: Arc<dyn BrokerTransport>,
    config: ConnectionManagerConfig,
    state: Mutex<ManagerState>,
    shutdown: CancellationToken,
    // Lock-free mirrors for status().
    connection: AtomicU8,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    queued: AtomicUsize,
}

/// Owns the broker connection and the outage queue.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn BrokerTransport>, config: ConnectionManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                state: Mutex::new(ManagerState {
                    connection: ConnectionState::Disconnected,
                    session: 0,
                    reconnecting: false,
                    queue: VecDeque::new(),
                }),
                shutdown: CancellationToken::new(),
                connection: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
                connected: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                queued: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.inner.config
    }

    /// Connects to the broker and flushes anything queued meanwhile.
    ///
    /// A failure here is reported to the caller and does not schedule any
    /// retry; reconnection only kicks in for links that were up and dropped.
    pub async fn connect(&self) -> BrokerResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::ShutDown);
        }

        {
            let mut state = self.inner.state.lock().await;
            if state.connection == ConnectionState::Connected {
                debug!("Already connected to MQTT broker");
                return Ok(());
            }
            self.set_connection(&mut state, ConnectionState::Connecting);
        }

        info!(
            broker_url = %self.inner.transport.broker_url(),
            client_id = %self.inner.transport.client_id(),
            "Connecting to MQTT broker"
        );

        let monitor = match self.inner.transport.connect().await {
            Ok(monitor) => monitor,
            Err(e) => {
                let mut state = self.inner.state.lock().await;
                self.set_connection(&mut state, ConnectionState::Disconnected);
                error!(error = %e, kind = e.kind(), "Failed to connect to MQTT broker");
                return Err(e);
            }
        };

        let mut state = self.inner.state.lock().await;
        if self.inner.shutdown.is_cancelled() {
            drop(state);
            let _ = self.inner.transport.disconnect().await;
            return Err(BrokerError::ShutDown);
        }

        state.session += 1;
        state.reconnecting = false;
        let session = state.session;
        self.set_connection(&mut state, ConnectionState::Connected);
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        info!(session = session, "Connected to MQTT broker");

        self.flush_queue(&mut state).await;
        drop(state);

        self.spawn_link_watcher(session, monitor);
        Ok(())
    }

    /// Sends a message now, or queues it until the next successful connect.
    ///
    /// Never returns an error: send failures are logged and reported as
    /// [`PublishOutcome::Failed`]. A send that finds the session already gone
    /// is queued like any other message published during an outage.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> PublishOutcome {
        let mut state = self.inner.state.lock().await;

        if state.connection == ConnectionState::Connected {
            match self.send(topic, &payload, options).await {
                Ok(()) => {
                    counter!("br_broker_published_total").increment(1);
                    debug!(topic = %topic, bytes = payload.len(), "Published message to MQTT");
                    return PublishOutcome::Sent;
                }
                // The link watcher has not caught up with the drop yet.
                Err(BrokerError::NotConnected) => {
                    warn!(topic = %topic, "MQTT session already closed, queueing message");
                }
                Err(e) => {
                    counter!("br_broker_publish_failures_total", "kind" => e.kind()).increment(1);
                    error!(topic = %topic, error = %e, "Failed to publish message to MQTT");
                    return PublishOutcome::Failed;
                }
            }
        } else {
            warn!(
                topic = %topic,
                state = %state.connection,
                "MQTT client not connected, queueing message"
            );
        }

        state
            .queue
            .push_back(QueuedMessage::new(topic, payload, options));
        counter!("br_broker_queued_total").increment(1);

        while state.queue.len() > self.inner.config.max_queued_messages {
            if let Some(dropped) = state.queue.pop_front() {
                counter!("br_broker_queue_dropped_total").increment(1);
                warn!(
                    topic = %dropped.topic,
                    enqueued_at = %dropped.enqueued_at,
                    max_queued = self.inner.config.max_queued_messages,
                    "Outage queue full, dropped oldest message"
                );
            }
        }
        self.record_queue_len(&state);

        PublishOutcome::Queued
    }

    /// Closes the broker session and stops any pending reconnection.
    ///
    /// The manager cannot be connected again afterwards.
    pub async fn disconnect(&self) -> BrokerResult<()> {
        self.inner.shutdown.cancel();

        {
            let mut state = self.inner.state.lock().await;
            state.reconnecting = false;
            self.set_connection(&mut state, ConnectionState::Disconnected);
            if !state.queue.is_empty() {
                warn!(
                    queued = state.queue.len(),
                    "Shutting down with undelivered queued messages"
                );
            }
        }

        info!("Disconnecting from MQTT broker");
        self.inner.transport.disconnect().await?;
        info!("Disconnected from MQTT broker");
        Ok(())
    }

    /// Snapshot for health reporting. Never waits.
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.inner.connected.load(Ordering::SeqCst),
            reconnect_attempts: self.inner.reconnect_attempts.load(Ordering::SeqCst),
            queued_messages: self.inner.queued.load(Ordering::SeqCst),
            broker_url: self.inner.transport.broker_url().to_string(),
            client_id: self.inner.transport.client_id().to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.connection.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Whether [`disconnect`](Self::disconnect) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn set_connection(&self, state: &mut ManagerState, connection: ConnectionState) {
        state.connection = connection;
        let connected = connection == ConnectionState::Connected;
        self.inner.connection.store(connection.as_u8(), Ordering::SeqCst);
        self.inner.connected.store(connected, Ordering::SeqCst);
        gauge!("br_broker_connected").set(if connected { 1.0 } else { 0.0 });
    }

    fn record_queue_len(&self, state: &ManagerState) {
        self.inner.queued.store(state.queue.len(), Ordering::SeqCst);
        gauge!("br_broker_queue_depth").set(state.queue.len() as f64);
    }

    /// Drains the queue in FIFO order. Failed sends are logged, not requeued.
    async fn flush_queue(&self, state: &mut ManagerState) {
        if state.queue.is_empty() {
            return;
        }

        let total = state.queue.len();
        info!(count = total, "Processing queued messages");

        let mut failed = 0usize;
        while let Some(queued) = state.queue.pop_front() {
            self.record_queue_len(state);
            match self
                .send(&queued.topic, &queued.payload, queued.options)
                .await
            {
                Ok(()) => counter!("br_broker_published_total").increment(1),
                Err(e) => {
                    failed += 1;
                    counter!("br_broker_publish_failures_total", "kind" => e.kind()).increment(1);
                    error!(topic = %queued.topic, error = %e, "Failed to publish queued message");
                }
            }
        }

        info!(count = total, failed = failed, "Finished processing queued messages");
    }

    /// One transport publish, bounded by `publish_timeout`.
    async fn send(
        &self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> BrokerResult<()> {
        let limit = self.inner.config.publish_timeout;
        let publish = self.inner.transport.publish(topic, payload, options);
        match tokio::time::timeout(limit, publish).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::timeout(format!(
                "publish to '{}' did not complete within {}ms",
                topic,
                limit.as_millis()
            ))),
        }
    }

    fn spawn_link_watcher(&self, session: u64, mut monitor: LinkMonitor) {
        let manager = self.clone();
        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = manager.inner.shutdown.cancelled() => return,
                event = monitor.recv() => match event {
                    Some(LinkEvent::Lost { reason }) => reason,
                    None => "link closed".to_string(),
                },
            };

            if manager.mark_link_lost(session, &reason).await {
                manager.reconnect_loop().await;
            }
        });
    }

    /// Moves to `Disconnected` if `session` is still the live one.
    ///
    /// Returns `true` if the caller should start reconnecting.
    async fn mark_link_lost(&self, session: u64, reason: &str) -> bool {
        if self.inner.shutdown.is_cancelled() {
            return false;
        }

        let mut state = self.inner.state.lock().await;
        if state.session != session || state.connection != ConnectionState::Connected {
            debug!(session = session, "Ignoring link event from stale session");
            return false;
        }

        self.set_connection(&mut state, ConnectionState::Disconnected);
        warn!(reason = %reason, "Disconnected from MQTT broker");

        if state.reconnecting {
            return false;
        }
        state.reconnecting = true;
        true
    }

    async fn reconnect_loop(&self) {
        let policy = self.inner.config.reconnect;

        loop {
            let attempt = self.inner.reconnect_attempts.load(Ordering::SeqCst) + 1;
            let Some(delay) = policy.delay_for_attempt(attempt) else {
                counter!("br_broker_reconnect_exhausted_total").increment(1);
                error!(
                    max_attempts = policy.max_attempts,
                    "Max reconnection attempts reached, giving up on MQTT broker"
                );
                break;
            };

            self.inner.reconnect_attempts.store(attempt, Ordering::SeqCst);
            counter!("br_broker_reconnect_attempts_total").increment(1);
            info!(
                attempt = attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Scheduling MQTT reconnection"
            );

            tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    debug!("Reconnection cancelled by shutdown");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.connect().await {
                // connect() cleared the reconnecting flag under the lock.
                Ok(()) => return,
                Err(BrokerError::ShutDown) => break,
                Err(e) => warn!(attempt = attempt, error = %e, "Reconnection attempt failed"),
            }
        }

        self.inner.state.lock().await.reconnecting = false;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::mock::MockBroker;
    use crate::messaging::types::QoS;
    use std::time::Duration;

    fn manager_with(broker: &Arc<MockBroker>, config: ConnectionManagerConfig) -> ConnectionManager {
        ConnectionManager::new(broker.clone(), config)
    }

    fn fast_config(max_attempts: u32) -> ConnectionManagerConfig {
        ConnectionManagerConfig {
            reconnect: ReconnectPolicy::new(Duration::from_millis(10), max_attempts),
            ..Default::default()
        }
    }

    fn opts() -> PublishOptions {
        PublishOptions::new(QoS::AtLeastOnce)
    }

    /// Polls `check` until it holds, advancing the (paused) clock.
    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..10_000 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_connect_and_publish() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, ConnectionManagerConfig::default());

        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);

        let outcome = manager.publish("alerts/high/triggered", b"1".to_vec(), opts()).await;
        assert_eq!(outcome, PublishOutcome::Sent);
        assert_eq!(broker.published_topics().await, vec!["alerts/high/triggered"]);
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_not_retried() {
        let broker = Arc::new(MockBroker::unreachable());
        let manager = manager_with(&broker, fast_config(5));

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, BrokerError::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(broker.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_queue_then_flush_in_order() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, ConnectionManagerConfig::default());

        for topic in ["m1", "m2", "m3"] {
            let outcome = manager.publish(topic, topic.as_bytes().to_vec(), opts()).await;
            assert_eq!(outcome, PublishOutcome::Queued);
        }
        assert_eq!(manager.status().queued_messages, 3);
        assert!(broker.published().await.is_empty());

        manager.connect().await.unwrap();
        manager.publish("m4", b"m4".to_vec(), opts()).await;

        assert_eq!(broker.published_topics().await, vec!["m1", "m2", "m3", "m4"]);
        assert_eq!(manager.status().queued_messages, 0);
    }

    #[tokio::test]
    async fn test_flush_failures_are_not_requeued() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, ConnectionManagerConfig::default());

        manager.publish("m1", b"1".to_vec(), opts()).await;
        broker.set_reject_publishes(true).await;
        manager.connect().await.unwrap();

        assert_eq!(manager.status().queued_messages, 0);
        assert!(broker.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, ConnectionManagerConfig::default());
        manager.connect().await.unwrap();
        broker.set_reject_publishes(true).await;

        let outcome = manager.publish("t", b"x".to_vec(), opts()).await;
        assert_eq!(outcome, PublishOutcome::Failed);
        assert!(manager.is_connected());
        assert_eq!(manager.status().queued_messages, 0);
    }

    #[tokio::test]
    async fn test_queue_bound_drops_oldest() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(
            &broker,
            ConnectionManagerConfig {
                max_queued_messages: 2,
                ..Default::default()
            },
        );

        for topic in ["m1", "m2", "m3"] {
            manager.publish(topic, b"x".to_vec(), opts()).await;
        }
        assert_eq!(manager.status().queued_messages, 2);

        manager.connect().await.unwrap();
        assert_eq!(broker.published_topics().await, vec!["m2", "m3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_drop_and_flushes() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(5));
        manager.connect().await.unwrap();

        broker.set_reachable(false).await;
        assert!(broker.drop_connection("network down").await);
        eventually(|| !manager.is_connected()).await;

        manager.publish("during-outage", b"x".to_vec(), opts()).await;
        assert_eq!(manager.status().queued_messages, 1);

        eventually(|| broker.connect_attempts() >= 3).await;
        broker.set_reachable(true).await;
        eventually(|| manager.is_connected()).await;

        assert_eq!(manager.status().reconnect_attempts, 0);
        assert_eq!(manager.status().queued_messages, 0);
        assert_eq!(broker.published_topics().await, vec!["during-outage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_double() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(4));
        manager.connect().await.unwrap();

        broker.set_reachable(false).await;
        let dropped_at = tokio::time::Instant::now();
        broker.drop_connection("gone").await;

        eventually(|| broker.connect_attempts() >= 5).await;

        let times = broker.connect_times().await;
        // times[0] is the initial connect; the rest are reconnect attempts.
        let mut previous = dropped_at;
        for (k, at) in times[1..].iter().enumerate() {
            let expected = Duration::from_millis(10 * 2u64.pow(k as u32));
            let waited = at.duration_since(previous);
            assert!(
                waited >= expected && waited < expected + Duration::from_millis(5),
                "attempt {} waited {:?}, expected {:?}",
                k + 1,
                waited,
                expected
            );
            previous = *at;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(3));
        manager.connect().await.unwrap();

        broker.set_reachable(false).await;
        broker.drop_connection("gone").await;

        eventually(|| broker.connect_attempts() >= 4).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(broker.connect_attempts(), 4);
        assert_eq!(manager.status().reconnect_attempts, 3);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_reconnection() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(10));
        manager.connect().await.unwrap();

        broker.set_reachable(false).await;
        broker.drop_connection("gone").await;
        eventually(|| broker.connect_attempts() >= 2).await;

        manager.disconnect().await.unwrap();
        let attempts = broker.connect_attempts();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(broker.connect_attempts(), attempts);
        assert!(manager.is_shut_down());
        assert!(matches!(manager.connect().await, Err(BrokerError::ShutDown)));
    }

    #[tokio::test]
    async fn test_clean_disconnect_does_not_reconnect() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(3));
        manager.connect().await.unwrap();

        manager.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(broker.connect_attempts(), 1);
        assert_eq!(broker.disconnect_count(), 1);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let broker = Arc::new(MockBroker::with_endpoint("mqtt://broker:1883", "pager"));
        let manager = manager_with(&broker, ConnectionManagerConfig::default());

        let status = manager.status();
        assert!(!status.connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert_eq!(status.broker_url, "mqtt://broker:1883");
        assert_eq!(status.client_id, "pager");

        manager.connect().await.unwrap();
        assert!(manager.status().connected);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_when_connected() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, ConnectionManagerConfig::default());
        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(broker.connect_attempts(), 1);
    }

    /// Transport whose publishes to `"stall"` never complete.
    #[derive(Default)]
    struct StallingTransport {
        link: std::sync::Mutex<Option<tokio::sync::mpsc::Sender<LinkEvent>>>,
        sent: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl BrokerTransport for StallingTransport {
        async fn connect(&self) -> BrokerResult<LinkMonitor> {
            let (tx, monitor) = LinkMonitor::channel();
            *self.link.lock().unwrap() = Some(tx);
            Ok(monitor)
        }

        async fn publish(
            &self,
            topic: &str,
            _payload: &[u8],
            _options: PublishOptions,
        ) -> BrokerResult<()> {
            if topic == "stall" {
                std::future::pending::<()>().await;
            }
            self.sent.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn disconnect(&self) -> BrokerResult<()> {
            self.link.lock().unwrap().take();
            Ok(())
        }

        fn broker_url(&self) -> &str {
            "mqtt://stalling:1883"
        }

        fn client_id(&self) -> &str {
            "stalling"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_publish_does_not_block_others() {
        let transport = Arc::new(StallingTransport::default());
        let manager = ConnectionManager::new(
            transport.clone(),
            ConnectionManagerConfig {
                publish_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );
        manager.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        let stalled = tokio::spawn({
            let manager = manager.clone();
            async move { manager.publish("stall", b"x".to_vec(), opts()).await }
        });
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(
            Duration::from_secs(10),
            manager.publish("other", b"y".to_vec(), opts()),
        )
        .await
        .expect("publish stuck behind a stalled send");

        assert_eq!(other, PublishOutcome::Sent);
        assert_eq!(stalled.await.unwrap(), PublishOutcome::Failed);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(*transport.sent.lock().unwrap(), vec!["other".to_string()]);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_after_silent_drop_is_queued() {
        let broker = Arc::new(MockBroker::new());
        let manager = manager_with(&broker, fast_config(5));
        manager.connect().await.unwrap();

        // The session is gone but the link watcher has not run yet.
        assert!(broker.drop_connection("event loop died").await);
        assert!(manager.is_connected());

        let outcome = manager.publish("in-window", b"x".to_vec(), opts()).await;
        assert_eq!(outcome, PublishOutcome::Queued);
        assert_eq!(manager.status().queued_messages, 1);

        eventually(|| manager.is_connected() && manager.status().queued_messages == 0).await;
        assert_eq!(broker.published_topics().await, vec!["in-window"]);
    }
}
