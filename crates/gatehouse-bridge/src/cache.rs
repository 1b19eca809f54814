use chrono::{DateTime, Utc};
use gatehouse_core::{ConnectionStatus, OperationResult};
use parking_lot::RwLock;
use std::time::Duration;

#[derive(Debug, Clone)]
struct CachedCheck {
    result: OperationResult,
    status: ConnectionStatus,
}

/// Last connectivity check, shared by every bridge operation.
///
/// Failed checks are cached the same as successful ones. Concurrent checks
/// may race; the last writer wins.
#[derive(Debug)]
pub struct ConnectivityCache {
    window: Duration,
    check: RwLock<Option<CachedCheck>>,
}

impl ConnectivityCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            check: RwLock::new(None),
        }
    }

    /// Cached check result if it is still inside the window at `now`.
    pub fn fresh_at(&self, now: DateTime<Utc>) -> Option<OperationResult> {
        let window = chrono::Duration::from_std(self.window).ok()?;
        let guard = self.check.read();
        let cached = guard.as_ref()?;
        cached
            .status
            .is_fresh(now, window)
            .then(|| cached.result.clone())
    }

    pub fn fresh(&self) -> Option<OperationResult> {
        self.fresh_at(Utc::now())
    }

    pub fn record_at(&self, result: &OperationResult, at: DateTime<Utc>) {
        *self.check.write() = Some(CachedCheck {
            result: result.clone(),
            status: ConnectionStatus::checked(result.success, at),
        });
    }

    pub fn record(&self, result: &OperationResult) {
        self.record_at(result, Utc::now());
    }

    pub fn status(&self) -> ConnectionStatus {
        self.check
            .read()
            .as_ref()
            .map(|cached| cached.status)
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        *self.check.write() = None;
    }
}
