//! Message bus abstraction.
//!
//! The correlator only needs three outbound operations and a stream of
//! inbound events. Implementations hand the event receiver out when they are
//! constructed; the correlator drains it in its run loop.

use crate::error::CorrelatorResult;
use bytes::Bytes;
use std::future::Future;

/// Inbound event from the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Connection (re)established; subscriptions must be renewed
    Connected,
    /// Connection lost or closed
    Disconnected { reason: String },
    /// Message on a subscribed topic
    Message { topic: String, payload: Bytes },
}

/// Publish/subscribe transport used by the correlator.
///
/// Publishes and subscriptions use at-least-once delivery.
pub trait MessageBus: Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: Bytes,
    ) -> impl Future<Output = CorrelatorResult<()>> + Send;

    fn subscribe(&self, topics: &[&str]) -> impl Future<Output = CorrelatorResult<()>> + Send;

    /// Close the connection and stop reconnecting.
    fn disconnect(&self) -> impl Future<Output = CorrelatorResult<()>> + Send;
}
