use crate::clients::BiometricServices;
use gatehouse_bridge::TerminalBridge;
use gatehouse_core::RegistrationUpdate;
use gatehouse_core::constants::FEED_PING_INTERVAL_SECS;
use gatehouse_correlator::{Correlator, MessageBus};
use gatehouse_relay::StreamRelay;
use gatehouse_storage::{SqliteUserRepository, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared handler state.
pub struct AppState<B> {
    pub bridge: Arc<TerminalBridge>,
    pub correlator: Correlator<B>,
    pub relay: Arc<StreamRelay>,
    pub users: SqliteUserRepository,
    pub services: BiometricServices,
    /// Interval between ping events on the status feed
    pub feed_ping: Duration,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            bridge: Arc::clone(&self.bridge),
            correlator: self.correlator.clone(),
            relay: Arc::clone(&self.relay),
            users: self.users.clone(),
            services: self.services.clone(),
            feed_ping: self.feed_ping,
        }
    }
}

impl<B: MessageBus> AppState<B> {
    pub fn new(
        bridge: TerminalBridge,
        correlator: Correlator<B>,
        relay: StreamRelay,
        users: SqliteUserRepository,
        services: BiometricServices,
    ) -> Self {
        Self {
            bridge: Arc::new(bridge),
            correlator,
            relay: Arc::new(relay),
            users,
            services,
            feed_ping: Duration::from_secs(FEED_PING_INTERVAL_SECS),
        }
    }

    pub fn feed_ping(mut self, interval: Duration) -> Self {
        self.feed_ping = interval;
        self
    }
}

/// Persist registration changes reported by the correlator until the
/// channel closes. Failures are logged and skipped.
pub async fn persist_registrations(
    mut updates: mpsc::UnboundedReceiver<RegistrationUpdate>,
    users: SqliteUserRepository,
) {
    while let Some(update) = updates.recv().await {
        match users.apply_registration(&update).await {
            Ok(user) => info!(
                user_id = %user.id,
                uid = %update.uid,
                kind = update.kind.column(),
                registered = update.registered,
                "Registration stored"
            ),
            Err(e) if e.is_not_found() => {
                warn!(uid = %update.uid, "No user holds this terminal uid, update dropped");
            }
            Err(e) => warn!(uid = %update.uid, error = %e, "Failed to store registration"),
        }
    }
    debug!("Registration channel closed");
}
