//! In-process bus for tests and local development.
//!
//! ```
//! use gatehouse_correlator::{BusEvent, MemoryBus, MessageBus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (bus, mut events) = MemoryBus::new();
//! bus.connect().await;
//! assert_eq!(events.recv().await, Some(BusEvent::Connected));
//!
//! bus.publish("acs_front_command", "mode;delete_card;5".into()).await.unwrap();
//! assert_eq!(bus.published_payloads("acs_front_command"), ["mode;delete_card;5"]);
//! # }
//! ```

use crate::bus::{BusEvent, MessageBus};
use crate::error::{CorrelatorError, CorrelatorResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug)]
struct Inner {
    events: mpsc::Sender<BusEvent>,
    connected: AtomicBool,
    published: Mutex<Vec<(String, Bytes)>>,
    subscriptions: Mutex<Vec<String>>,
}

/// Bus that records publishes and lets the caller inject inbound traffic.
///
/// Clones share state, so a test can keep one handle while the correlator
/// owns another.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    pub fn new() -> (Self, mpsc::Receiver<BusEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let bus = Self {
            inner: Arc::new(Inner {
                events,
                connected: AtomicBool::new(false),
                published: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        };
        (bus, rx)
    }

    /// Simulate a successful connack.
    pub async fn connect(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        let _ = self.inner.events.send(BusEvent::Connected).await;
    }

    /// Simulate an unexpected connection loss.
    pub async fn drop_connection(&self, reason: &str) {
        self.inner.connected.store(false, Ordering::SeqCst);
        let _ = self
            .inner
            .events
            .send(BusEvent::Disconnected {
                reason: reason.to_string(),
            })
            .await;
    }

    /// Deliver a message as if a device published it.
    pub async fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        let _ = self
            .inner
            .events
            .send(BusEvent::Message {
                topic: topic.to_string(),
                payload: payload.into(),
            })
            .await;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.inner.published.lock().clone()
    }

    /// Payloads published to `topic`, as text.
    pub fn published_payloads(&self, topic: &str) -> Vec<String> {
        self.inner
            .published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().clone()
    }
}

impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> CorrelatorResult<()> {
        if !self.is_connected() {
            return Err(CorrelatorError::NotConnected);
        }
        self.inner
            .published
            .lock()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topics: &[&str]) -> CorrelatorResult<()> {
        let mut subscriptions = self.inner.subscriptions.lock();
        for topic in topics {
            if !subscriptions.iter().any(|t| t == topic) {
                subscriptions.push(topic.to_string());
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> CorrelatorResult<()> {
        self.drop_connection("client requested disconnect").await;
        Ok(())
    }
}
