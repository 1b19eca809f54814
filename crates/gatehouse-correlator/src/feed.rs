//! Live status feed.
//!
//! Every status message and connection change is broadcast here, whether or
//! not a caller is waiting for it. Late answers that arrive after a caller
//! timed out are still visible through the feed and its snapshots.

use chrono::{DateTime, Utc};
use gatehouse_core::Device;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Kind of feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedEventKind {
    Connection,
    Status,
    Ping,
}

/// One item of the status feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub kind: FeedEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn ping() -> Self {
        Self {
            kind: FeedEventKind::Ping,
            topic: None,
            device: None,
            data: Value::Null,
            timestamp: Utc::now(),
        }
    }
}

/// Broker connection state as reported on the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    pub error: Option<String>,
    pub last_connected: Option<DateTime<Utc>>,
}

/// Point-in-time view of the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    #[serde(flatten)]
    pub connection: ConnectionState,
    pub last_status: Option<StatusEvent>,
    pub last_response: Option<StatusEvent>,
}

#[derive(Debug, Default)]
struct FeedState {
    connection: ConnectionState,
    last_status: Option<StatusEvent>,
    last_response: Option<StatusEvent>,
}

#[derive(Debug)]
pub struct StatusFeed {
    tx: broadcast::Sender<StatusEvent>,
    state: RwLock<FeedState>,
}

impl StatusFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            state: RwLock::new(FeedState::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.read().connection.clone()
    }

    /// Record a connection change and broadcast it.
    pub fn set_connection(&self, connected: bool, error: Option<String>) {
        let connection = {
            let mut state = self.state.write();
            state.connection.connected = connected;
            state.connection.error = error;
            if connected {
                state.connection.last_connected = Some(Utc::now());
            }
            state.connection.clone()
        };

        self.broadcast(StatusEvent {
            kind: FeedEventKind::Connection,
            topic: None,
            device: None,
            data: serde_json::to_value(&connection).unwrap_or(Value::Null),
            timestamp: Utc::now(),
        });
    }

    /// Record a device status and broadcast it.
    ///
    /// Terminal statuses also replace the last response snapshot.
    pub fn record_status(&self, topic: &str, data: Value, terminal: bool) -> StatusEvent {
        let event = StatusEvent {
            kind: FeedEventKind::Status,
            topic: Some(topic.to_string()),
            device: Some(Device::from_topic(topic)),
            data,
            timestamp: Utc::now(),
        };

        {
            let mut state = self.state.write();
            state.last_status = Some(event.clone());
            if terminal {
                state.last_response = Some(event.clone());
            }
        }

        self.broadcast(event.clone());
        event
    }

    /// Current connection plus the most recent status and response.
    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.read();
        FeedSnapshot {
            connection: state.connection.clone(),
            last_status: state.last_status.clone(),
            last_response: state.last_response.clone(),
        }
    }

    /// Event announcing the current connection state, sent first to new
    /// feed subscribers.
    pub fn connection_event(&self) -> StatusEvent {
        StatusEvent {
            kind: FeedEventKind::Connection,
            topic: None,
            device: None,
            data: serde_json::to_value(self.connection()).unwrap_or(Value::Null),
            timestamp: Utc::now(),
        }
    }

    fn broadcast(&self, event: StatusEvent) {
        // No subscribers is the common case; the snapshot still holds the event.
        let _ = self.tx.send(event);
    }
}
