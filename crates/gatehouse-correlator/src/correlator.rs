//! Command/response correlation over the bus.
//!
//! Devices answer on status topics without echoing any request id, so a
//! terminal status is matched to a pending command by verb and, when the
//! status carries one, by uid. Each issued command gets its own correlation
//! id and completion; at most one command per verb is pending at a time.

use crate::bus::{BusEvent, MessageBus};
use crate::error::{CorrelatorError, CorrelatorResult};
use crate::feed::StatusFeed;
use bytes::Bytes;
use gatehouse_core::constants::{COMMAND_TOPICS, DEFAULT_COMMAND_TIMEOUT_MS, STATUS_TOPICS};
use gatehouse_core::{BusVerb, Device, OperationResult, RegistrationKind, RegistrationUpdate};
use gatehouse_protocol::{Command, StatusMessage};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Correlator settings
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Timeout used when the caller does not give one
    pub default_timeout: Duration,
    /// How often expired entries are swept
    pub sweep_interval: Duration,
    /// Buffered events per feed subscriber
    pub feed_capacity: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(1),
            feed_capacity: 128,
        }
    }
}

#[derive(Debug)]
struct PendingCommand {
    command: Command,
    issued_at: Instant,
    deadline: Instant,
    timeout: Duration,
    completion: oneshot::Sender<CorrelatorResult<OperationResult>>,
}

impl PendingCommand {
    fn matches(&self, verb: BusVerb, status: &StatusMessage) -> bool {
        self.command.verb() == verb
            && status
                .uid()
                .is_none_or(|uid| uid == self.command.uid())
    }

    fn complete(self, result: CorrelatorResult<OperationResult>) {
        // The caller may have given up already.
        let _ = self.completion.send(result);
    }
}

struct Shared {
    config: CorrelatorConfig,
    pending: Mutex<HashMap<Uuid, PendingCommand>>,
    connected: AtomicBool,
    feed: StatusFeed,
    updates: mpsc::UnboundedSender<RegistrationUpdate>,
}

/// Issues bus commands and routes device answers back to their callers.
pub struct Correlator<B> {
    bus: Arc<B>,
    shared: Arc<Shared>,
}

impl<B> Clone for Correlator<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: MessageBus> Correlator<B> {
    /// Create a correlator over `bus`.
    ///
    /// The returned receiver yields one [`RegistrationUpdate`] per successful
    /// command that changes a credential. Persisting them is up to the
    /// receiver and is best effort.
    pub fn new(
        bus: B,
        config: CorrelatorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RegistrationUpdate>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let feed = StatusFeed::new(config.feed_capacity);
        let correlator = Self {
            bus: Arc::new(bus),
            shared: Arc::new(Shared {
                config,
                pending: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
                feed,
                updates,
            }),
        };
        (correlator, rx)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn feed(&self) -> &StatusFeed {
        &self.shared.feed
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn default_timeout(&self) -> Duration {
        self.shared.config.default_timeout
    }

    /// Publish `command` to every device and wait for its terminal status.
    ///
    /// Never fails past this boundary: disconnection, publish errors,
    /// supersession and timeouts all come back as failed results.
    pub async fn send(&self, command: Command, timeout: Option<Duration>) -> OperationResult {
        self.dispatch(command, timeout)
            .await
            .unwrap_or_else(OperationResult::from)
    }

    /// Like [`send`](Self::send), but keeps local failures apart from device
    /// answers. `Ok` carries whatever the device reported, failures included.
    pub async fn dispatch(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> CorrelatorResult<OperationResult> {
        if !self.is_connected() {
            return Err(CorrelatorError::NotConnected);
        }

        let timeout = timeout.unwrap_or(self.shared.config.default_timeout);
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let now = Instant::now();

        let superseded = {
            let mut pending = self.shared.pending.lock();
            let stale: Vec<Uuid> = pending
                .iter()
                .filter(|(_, p)| p.command.verb() == command.verb())
                .map(|(id, _)| *id)
                .collect();
            let superseded: Vec<PendingCommand> =
                stale.iter().filter_map(|id| pending.remove(id)).collect();
            pending.insert(
                id,
                PendingCommand {
                    command: command.clone(),
                    issued_at: now,
                    deadline: now + timeout,
                    timeout,
                    completion: tx,
                },
            );
            superseded
        };

        for old in superseded {
            warn!(
                verb = %old.command.verb(),
                uid = %old.command.uid(),
                "Pending command superseded by a newer one"
            );
            let verb = old.command.verb();
            old.complete(Err(CorrelatorError::Superseded { verb }));
        }

        let payload = Bytes::from(command.to_string());
        for topic in COMMAND_TOPICS {
            if let Err(e) = self.bus.publish(topic, payload.clone()).await {
                error!(%id, topic, error = %e, "Failed to publish command");
                self.shared.pending.lock().remove(&id);
                return Err(e);
            }
        }
        info!(%id, command = %command, timeout_ms = timeout.as_millis() as u64, "Command published");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CorrelatorError::Cancelled),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                warn!(%id, command = %command, "Command timed out");
                Err(CorrelatorError::Timeout {
                    ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Drain bus events until the bus closes its channel.
    pub async fn run(&self, mut events: mpsc::Receiver<BusEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Bus event channel closed");
    }

    pub async fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Connected => {
                self.shared.connected.store(true, Ordering::SeqCst);
                if let Err(e) = self.bus.subscribe(&STATUS_TOPICS).await {
                    error!(error = %e, "Failed to subscribe to status topics");
                }
                self.shared.feed.set_connection(true, None);
            }
            BusEvent::Disconnected { reason } => {
                self.shared.connected.store(false, Ordering::SeqCst);
                warn!(%reason, "Broker connection lost");
                self.shared.feed.set_connection(false, Some(reason));
            }
            BusEvent::Message { topic, payload } => self.handle_status(&topic, &payload),
        }
    }

    fn handle_status(&self, topic: &str, payload: &[u8]) {
        let device = Device::from_topic(topic);
        let data = serde_json::from_slice::<Value>(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()));

        let status = match StatusMessage::parse(payload) {
            Ok(status) => status,
            Err(e) => {
                warn!(topic, error = %e, "Unparseable status message");
                self.shared.feed.record_status(topic, data, false);
                return;
            }
        };

        let terminal = status.is_terminal();
        self.shared.feed.record_status(topic, data, terminal);

        if !terminal {
            debug!(%device, mode = %status.mode, status = %status.status, "Progress");
            return;
        }

        let Some(verb) = status.verb() else {
            debug!(%device, mode = %status.mode, "Terminal status for a verb the gateway does not issue");
            return;
        };

        let matched = {
            let mut pending = self.shared.pending.lock();
            let id = pending
                .iter()
                .find(|(_, p)| p.matches(verb, &status))
                .map(|(id, _)| *id);
            id.and_then(|id| pending.remove(&id).map(|p| (id, p)))
        };

        let Some((id, pending)) = matched else {
            debug!(%device, %verb, status = %status.status, "No pending command for terminal status");
            return;
        };

        let result = status.to_result();
        info!(
            %id,
            %device,
            %verb,
            uid = %pending.command.uid(),
            success = result.success,
            elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
            "Command completed"
        );

        if result.success
            && let Some(update) = registration_update(&pending.command, &status)
            && self.shared.updates.send(update).is_err()
        {
            warn!(%id, "Registration update dropped, no receiver");
        }

        pending.complete(Ok(result));
    }

    /// Fail and remove every entry whose deadline has passed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<PendingCommand> = {
            let mut pending = self.shared.pending.lock();
            let ids: Vec<Uuid> = pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = expired.len();
        for entry in expired {
            let ms = entry.timeout.as_millis() as u64;
            entry.complete(Err(CorrelatorError::Timeout { ms }));
        }
        if count > 0 {
            debug!(count, "Swept expired commands");
        }
        count
    }

    /// Sweep expired entries on a fixed interval, forever.
    pub async fn run_sweeper(&self) {
        let mut interval = tokio::time::interval(self.shared.config.sweep_interval);
        loop {
            interval.tick().await;
            self.sweep_expired();
        }
    }

    /// Disconnect from the broker; no reconnect follows.
    pub async fn disconnect(&self) -> OperationResult {
        self.shared.connected.store(false, Ordering::SeqCst);
        match self.bus.disconnect().await {
            Ok(()) => OperationResult::with_message("Disconnected"),
            Err(e) => e.into(),
        }
    }
}

/// Credential change implied by a successful command, if any.
pub fn registration_update(command: &Command, status: &StatusMessage) -> Option<RegistrationUpdate> {
    let uid = status.uid().unwrap_or(command.uid());
    let (kind, registered, card_number) = match command.verb() {
        BusVerb::RegisterFingerprint => (RegistrationKind::Fingerprint, true, None),
        BusVerb::DeleteFingerprint => (RegistrationKind::Fingerprint, false, None),
        BusVerb::RegisterCard => (RegistrationKind::Card, true, status.data_text("card")),
        BusVerb::DeleteCard => (RegistrationKind::Card, false, None),
        BusVerb::DeleteUser => return None,
    };
    Some(RegistrationUpdate {
        uid,
        kind,
        registered,
        card_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::Uid;
    use rstest::rstest;
    use serde_json::json;

    fn uid(v: u64) -> Uid {
        Uid::new(v).unwrap()
    }

    fn status(value: Value) -> StatusMessage {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case(Command::register_fingerprint(uid(4), 2).unwrap(), Some((RegistrationKind::Fingerprint, true)))]
    #[case(Command::delete_fingerprint(uid(4), 2).unwrap(), Some((RegistrationKind::Fingerprint, false)))]
    #[case(Command::delete_card(uid(4)), Some((RegistrationKind::Card, false)))]
    #[case(Command::delete_user(uid(4)), None)]
    fn test_registration_update_mapping(
        #[case] command: Command,
        #[case] expected: Option<(RegistrationKind, bool)>,
    ) {
        let message = status(json!({"Mode": command.verb().as_str(), "Status": "success"}));
        let update = registration_update(&command, &message);
        assert_eq!(update.map(|u| (u.kind, u.registered)), expected);
    }

    #[test]
    fn test_card_registration_carries_number() {
        let command = Command::register_card(uid(9));
        let message = status(json!({
            "Mode": "register_card",
            "Status": "success",
            "Data": {"uid": 9, "card": 12345678}
        }));

        let update = registration_update(&command, &message).unwrap();
        assert_eq!(update.card_number.as_deref(), Some("12345678"));
        assert_eq!(update.uid, uid(9));
    }

    #[test]
    fn test_pending_match_rules() {
        let (tx, _rx) = oneshot::channel();
        let now = Instant::now();
        let pending = PendingCommand {
            command: Command::delete_card(uid(5)),
            issued_at: now,
            deadline: now,
            timeout: Duration::ZERO,
            completion: tx,
        };

        let same = status(json!({"Mode": "delete_card", "Status": "success", "Data": {"uid": 5}}));
        let other_uid = status(json!({"Mode": "delete_card", "Status": "success", "Data": {"uid": 6}}));
        let no_uid = status(json!({"Mode": "delete_card", "Status": "success"}));

        assert!(pending.matches(BusVerb::DeleteCard, &same));
        assert!(!pending.matches(BusVerb::DeleteCard, &other_uid));
        assert!(pending.matches(BusVerb::DeleteCard, &no_uid));
        assert!(!pending.matches(BusVerb::RegisterCard, &same));
    }
}
