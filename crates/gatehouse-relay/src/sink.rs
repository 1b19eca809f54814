//! Client-facing side of a relay session.
//!
//! ```text
//! StreamSession ──write()──> GuardedSink ──send()──> Outbound (HTTP body channel)
//!                                │
//!                                └── closed flag checked before every write
//! ```

use crate::error::RelayError;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Destination for multipart sections.
pub trait Outbound: Send + 'static {
    /// Deliver one complete section. Returns `false` once the peer is gone.
    fn send(&mut self, section: Bytes) -> impl Future<Output = bool> + Send;

    /// Resolves when the peer goes away.
    fn peer_gone(&self) -> impl Future<Output = ()> + Send;

    /// End the stream, optionally with an error.
    fn finish(self, error: Option<RelayError>);
}

impl Outbound for mpsc::Sender<Result<Bytes, RelayError>> {
    async fn send(&mut self, section: Bytes) -> bool {
        mpsc::Sender::send(self, Ok(section)).await.is_ok()
    }

    async fn peer_gone(&self) {
        self.closed().await;
    }

    fn finish(self, error: Option<RelayError>) {
        if let Some(error) = error {
            // Best effort: the body may already be gone or full.
            let _ = self.try_send(Err(error));
        }
    }
}

/// Outbound wrapper enforcing the closed guard.
///
/// Once closed, writes are dropped without reaching the outbound, and the
/// outbound is finished at most once.
#[derive(Debug)]
pub struct GuardedSink<O> {
    inner: Option<O>,
    closed: Arc<AtomicBool>,
    sections: u64,
}

impl<O: Outbound> GuardedSink<O> {
    pub fn new(outbound: O) -> Self {
        Self {
            inner: Some(outbound),
            closed: Arc::new(AtomicBool::new(false)),
            sections: 0,
        }
    }

    /// Shared flag; setting it stops all further writes.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Sections delivered so far.
    pub fn sections(&self) -> u64 {
        self.sections
    }

    /// Write one section unless closed. Returns `false` if nothing was written.
    pub async fn write(&mut self, section: Bytes) -> bool {
        if self.is_closed() {
            debug!("Dropping section, sink closed");
            return false;
        }
        let Some(outbound) = self.inner.as_mut() else {
            return false;
        };

        if outbound.send(section).await {
            self.sections += 1;
            true
        } else {
            warn!(sections = self.sections, "Client went away during write");
            self.mark_closed();
            false
        }
    }

    /// Resolves when the peer goes away; immediately if already finished.
    pub async fn peer_gone(&self) {
        if let Some(outbound) = self.inner.as_ref() {
            outbound.peer_gone().await;
        }
    }

    /// Close and finish the outbound. Returns `false` if it was already
    /// finished.
    pub fn close(&mut self, error: Option<RelayError>) -> bool {
        self.mark_closed();
        match self.inner.take() {
            Some(outbound) => {
                outbound.finish(error);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_after_close_is_dropped() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = GuardedSink::new(tx);

        assert!(sink.write(Bytes::from_static(b"one")).await);
        assert!(sink.close(None));
        assert!(!sink.write(Bytes::from_static(b"two")).await);
        assert!(!sink.close(None));

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from_static(b"one"));
        assert!(rx.recv().await.is_none());
        assert_eq!(sink.sections(), 1);
    }

    #[tokio::test]
    async fn test_flag_blocks_writes() {
        let (tx, _rx) = mpsc::channel(4);
        let mut sink = GuardedSink::new(tx);
        sink.closed_flag().store(true, Ordering::SeqCst);
        assert!(!sink.write(Bytes::from_static(b"x")).await);
    }

    #[tokio::test]
    async fn test_receiver_drop_is_detected() {
        let (tx, rx) = mpsc::channel(4);
        let mut sink = GuardedSink::new(tx);
        drop(rx);

        sink.peer_gone().await;
        assert!(!sink.write(Bytes::from_static(b"x")).await);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_close_with_error_reaches_body() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = GuardedSink::new(tx);
        sink.close(Some(RelayError::Exited { code: Some(1) }));

        let item = rx.recv().await.unwrap();
        assert!(matches!(item, Err(RelayError::Exited { code: Some(1) })));
    }
}
