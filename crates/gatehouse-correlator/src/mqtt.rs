//! MQTT transport built on rumqttc.
//!
//! # Architecture
//!
//! ```text
//! MqttBus ──publish/subscribe──> AsyncClient ──> request queue
//!                                                     │
//!                      driver task: EventLoop::poll() ┘
//!                           │
//!                           ├─ ConnAck  ──> BusEvent::Connected
//!                           ├─ Publish  ──> BusEvent::Message
//!                           └─ error    ──> BusEvent::Disconnected, sleep, poll again
//! ```
//!
//! Polling the event loop again after an error makes rumqttc reconnect, so
//! the fixed delay between polls is the reconnect delay. Once
//! [`MessageBus::disconnect`] has been called the driver exits instead.

use crate::bus::{BusEvent, MessageBus};
use crate::error::{CorrelatorError, CorrelatorResult};
use bytes::Bytes;
use chrono::Utc;
use gatehouse_core::Error;
use gatehouse_core::constants::{BROKER_KEEPALIVE_SECS, RECONNECT_DELAY_SECS};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How the broker is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrokerTransport {
    Tcp,
    /// MQTT over WebSocket at `ws://host:port/mqtt`
    #[default]
    Ws,
}

impl FromStr for BrokerTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => Ok(BrokerTransport::Tcp),
            "ws" | "websocket" => Ok(BrokerTransport::Ws),
            other => Err(Error::Config(format!("unknown broker transport: {other}"))),
        }
    }
}

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub transport: BrokerTransport,
    /// Fixed client id; a timestamped one is generated when unset
    pub client_id: Option<String>,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    /// Capacity of the request queue and the event channel
    pub capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.86".to_string(),
            port: 9001,
            username: None,
            password: None,
            transport: BrokerTransport::Ws,
            client_id: None,
            keep_alive: Duration::from_secs(BROKER_KEEPALIVE_SECS),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            capacity: 64,
        }
    }
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn transport(mut self, transport: BrokerTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Address handed to rumqttc; a full URL for WebSocket.
    pub fn broker_address(&self) -> String {
        match self.transport {
            BrokerTransport::Tcp => self.host.clone(),
            BrokerTransport::Ws => format!("ws://{}:{}/mqtt", self.host, self.port),
        }
    }

    fn resolved_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("gatehouse_{}", Utc::now().timestamp_millis()))
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(self.resolved_client_id(), self.broker_address(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        if self.transport == BrokerTransport::Ws {
            options.set_transport(Transport::Ws);
        }
        options
    }
}

/// Bus backed by a live broker connection.
#[derive(Debug)]
pub struct MqttBus {
    client: AsyncClient,
    stop: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl MqttBus {
    /// Create the client and spawn the event loop driver.
    ///
    /// Must be called from within a tokio runtime. The connection is
    /// established by the driver; watch the receiver for
    /// [`BusEvent::Connected`].
    pub fn start(config: &BrokerConfig) -> (Self, mpsc::Receiver<BusEvent>) {
        info!(
            broker = %config.broker_address(),
            port = config.port,
            transport = ?config.transport,
            "Connecting to message broker"
        );

        let (client, eventloop) = AsyncClient::new(config.mqtt_options(), config.capacity);
        let (events, rx) = mpsc::channel(config.capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let driver = tokio::spawn(drive(
            eventloop,
            events,
            Arc::clone(&stop),
            config.reconnect_delay,
        ));

        (
            Self {
                client,
                stop,
                driver,
            },
            rx,
        )
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::Sender<BusEvent>,
    stop: Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "Connected to message broker");
                BusEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "Message received");
                BusEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload,
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect requested, stopping broker driver");
                let _ = events
                    .send(BusEvent::Disconnected {
                        reason: "client requested disconnect".to_string(),
                    })
                    .await;
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    let _ = events
                        .send(BusEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    break;
                }
                error!(error = %e, "Broker connection error");
                if events
                    .send(BusEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await
                    .is_err()
                {
                    break;
                }
                warn!(
                    delay_secs = reconnect_delay.as_secs(),
                    "Reconnecting to message broker after delay"
                );
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        if events.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping broker driver");
            break;
        }
    }
}

impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> CorrelatorResult<()> {
        self.client
            .publish_bytes(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| {
                error!(topic, error = %e, "Failed to publish");
                CorrelatorError::Publish {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                }
            })
    }

    async fn subscribe(&self, topics: &[&str]) -> CorrelatorResult<()> {
        for topic in topics {
            self.client
                .subscribe(*topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| CorrelatorError::Subscribe {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
            info!(topic, "Subscribed to status topic");
        }
        Ok(())
    }

    async fn disconnect(&self) -> CorrelatorResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|e| CorrelatorError::Disconnect(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_websocket_address() {
        let config = BrokerConfig::new("10.0.0.5", 9001);
        assert_eq!(config.broker_address(), "ws://10.0.0.5:9001/mqtt");
    }

    #[test]
    fn test_tcp_address() {
        let config = BrokerConfig::new("10.0.0.5", 1883).transport(BrokerTransport::Tcp);
        assert_eq!(config.broker_address(), "10.0.0.5");
    }

    #[test]
    fn test_generated_client_id() {
        let id = BrokerConfig::default().resolved_client_id();
        assert!(id.starts_with("gatehouse_"));
        assert!(id["gatehouse_".len()..].parse::<i64>().is_ok());

        let fixed = BrokerConfig::default().client_id("gate-1").resolved_client_id();
        assert_eq!(fixed, "gate-1");
    }

    #[test]
    fn test_options_keep_alive() {
        let options = BrokerConfig::default().mqtt_options();
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert!(options.clean_session());
    }

    #[rstest]
    #[case("ws", BrokerTransport::Ws)]
    #[case("WebSocket", BrokerTransport::Ws)]
    #[case("tcp", BrokerTransport::Tcp)]
    fn test_transport_parse(#[case] text: &str, #[case] expected: BrokerTransport) {
        assert_eq!(text.parse::<BrokerTransport>().unwrap(), expected);
    }

    #[test]
    fn test_transport_parse_rejects_unknown() {
        assert!("quic".parse::<BrokerTransport>().is_err());
    }
}
