//! MQTT 3.1.1 transport built on `rumqttc`.
//!
//! Each [`connect`](BrokerTransport::connect) builds a fresh client and
//! event loop, drives the loop until CONNACK, then hands the loop to a
//! background task that keeps it polled (needed for keep-alives and QoS 1/2
//! acknowledgements). When that task sees an error it reports
//! [`LinkEvent::Lost`] and stops: `rumqttc` would otherwise reconnect on its
//! own, and reconnection policy belongs to the connection manager.

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::error::{BrokerError, BrokerResult};
use super::types::{LinkEvent, LinkMonitor, PublishOptions};
use super::BrokerTransport;

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTTS_PORT: u16 = 8883;
const CLIENT_CHANNEL_CAPACITY: usize = 64;
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Settings for [`MqttTransport`].
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    /// `mqtt://`, `tcp://`, `mqtts://` or `ssl://` URL. Credentials embedded
    /// in the URL are used when `username` is not set.
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    /// How long to wait for CONNACK.
    pub connect_timeout: Duration,
}

impl MqttTransportConfig {
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            ..Default::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            broker_url: format!("mqtt://localhost:{}", DEFAULT_MQTT_PORT),
            client_id: "beeper-service".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Parsed form of a broker URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerAddress {
    pub fn parse(url: &str) -> BrokerResult<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| BrokerError::configuration(format!("missing scheme in '{}'", url)))?;

        let tls = match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" | "tls" => true,
            other => {
                return Err(BrokerError::configuration(format!(
                    "unsupported scheme '{}', expected mqtt, mqtts, tcp or ssl",
                    other
                )))
            }
        };

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        let default_port = if tls { DEFAULT_MQTTS_PORT } else { DEFAULT_MQTT_PORT };
        let (host, port) = match hostport.strip_prefix('[') {
            // [v6-address]:port
            Some(bracketed) => {
                let (host, after) = bracketed.split_once(']').ok_or_else(|| {
                    BrokerError::configuration(format!("unterminated IPv6 host in '{}'", url))
                })?;
                (host, after.strip_prefix(':'))
            }
            None => match hostport.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (hostport, None),
            },
        };
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| {
                BrokerError::configuration(format!("invalid port '{}' in '{}'", port, url))
            })?,
            None => default_port,
        };

        if host.is_empty() {
            return Err(BrokerError::configuration(format!("missing host in '{}'", url)));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
            username: username.filter(|u| !u.is_empty()),
            password,
        })
    }
}

struct MqttSession {
    client: AsyncClient,
    poller: JoinHandle<()>,
    closing: Arc<AtomicBool>,
}

/// [`BrokerTransport`] backed by a real MQTT broker.
pub struct MqttTransport {
    config: MqttTransportConfig,
    address: BrokerAddress,
    session: Mutex<Option<MqttSession>>,
}

impl MqttTransport {
    /// Validates the broker URL. Does not touch the network.
    pub fn new(config: MqttTransportConfig) -> BrokerResult<Self> {
        let address = BrokerAddress::parse(&config.broker_url)?;
        Ok(Self {
            config,
            address,
            session: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    fn options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(
            self.config.client_id.clone(),
            self.address.host.clone(),
            self.address.port,
        );
        opts.set_keep_alive(self.config.keep_alive);
        opts.set_clean_session(true);

        let username = self
            .config
            .username
            .clone()
            .or_else(|| self.address.username.clone());
        let password = self
            .config
            .password
            .clone()
            .or_else(|| self.address.password.clone());
        if let Some(username) = username {
            opts.set_credentials(username, password.unwrap_or_default());
        }

        if self.address.tls {
            opts.set_transport(Transport::tls_with_default_config());
        }
        opts
    }

    async fn await_connack(&self, event_loop: &mut EventLoop) -> BrokerResult<()> {
        let handshake = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        debug!(session_present = ack.session_present, "Received CONNACK");
                        return Ok(());
                    }
                    Ok(event) => trace!(?event, "MQTT event before CONNACK"),
                    Err(e) => return Err(connection_error(e)),
                }
            }
        };

        tokio::time::timeout(self.config.connect_timeout, handshake)
            .await
            .map_err(|_| {
                BrokerError::timeout(format!(
                    "no CONNACK from {} within {:?}",
                    self.config.broker_url, self.config.connect_timeout
                ))
            })?
    }

    async fn close_session(session: MqttSession) {
        session.closing.store(true, Ordering::SeqCst);
        if let Err(e) = session.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request failed");
        }

        let mut poller = session.poller;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut poller).await.is_err() {
            warn!("MQTT event loop did not stop in time, aborting it");
            poller.abort();
        }
    }
}

fn connection_error(err: ConnectionError) -> BrokerError {
    match err {
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            BrokerError::timeout(err.to_string())
        }
        other => BrokerError::connection(other.to_string()),
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    link: mpsc::Sender<LinkEvent>,
    closing: Arc<AtomicBool>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                trace!("MQTT disconnect sent, stopping event loop");
                break;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = link
                    .send(LinkEvent::Lost {
                        reason: "broker closed the session".to_string(),
                    })
                    .await;
                break;
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(e) => {
                if !closing.load(Ordering::SeqCst) {
                    let _ = link
                        .send(LinkEvent::Lost {
                            reason: e.to_string(),
                        })
                        .await;
                }
                break;
            }
        }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    async fn connect(&self) -> BrokerResult<LinkMonitor> {
        let mut current = self.session.lock().await;
        if let Some(previous) = current.take() {
            Self::close_session(previous).await;
        }

        let (client, mut event_loop) = AsyncClient::new(self.options(), CLIENT_CHANNEL_CAPACITY);
        self.await_connack(&mut event_loop).await?;

        let (link, monitor) = LinkMonitor::channel();
        let closing = Arc::new(AtomicBool::new(false));
        let poller = tokio::spawn(drive_event_loop(event_loop, link, closing.clone()));

        info!(
            host = %self.address.host,
            port = self.address.port,
            tls = self.address.tls,
            client_id = %self.config.client_id,
            "MQTT session established"
        );

        *current = Some(MqttSession {
            client,
            poller,
            closing,
        });
        Ok(monitor)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        options: PublishOptions,
    ) -> BrokerResult<()> {
        let current = self.session.lock().await;
        let session = current.as_ref().ok_or(BrokerError::NotConnected)?;
        if session.poller.is_finished() {
            return Err(BrokerError::NotConnected);
        }

        // Never wait for room in the request channel.
        session
            .client
            .try_publish(topic, options.qos.into(), options.retain, payload.to_vec())
            .map_err(|e| {
                if session.poller.is_finished() {
                    BrokerError::NotConnected
                } else {
                    BrokerError::publish(format!("request queue full: {}", e))
                }
            })
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            Self::close_session(session).await;
        }
        Ok(())
    }

    fn broker_url(&self) -> &str {
        &self.config.broker_url
    }

    fn client_id(&self) -> &str {
        &self.config.client_id
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("broker_url", &self.config.broker_url)
            .field("client_id", &self.config.client_id)
            .finish()
    }
}
