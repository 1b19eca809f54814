use crate::error::{RelayError, RelayResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use gatehouse_protocol::MjpegCodec;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::codec::FramedRead;
use tracing::{info, warn};

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A single captured frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub success: bool,
    /// `data:image/jpeg;base64,...`
    pub image: String,
    /// Frame size in bytes before encoding
    pub size: usize,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_frame(frame: &[u8]) -> Self {
        Self {
            success: true,
            image: format!("{DATA_URL_PREFIX}{}", STANDARD.encode(frame)),
            size: frame.len(),
            timestamp: Utc::now(),
        }
    }
}

/// Run `command` and return its first complete frame.
///
/// The process is killed once a frame arrives or the timeout expires.
pub async fn capture(mut command: Command, timeout: Duration) -> RelayResult<Snapshot> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(RelayError::Spawn)?;
    let stdout = child.stdout.take().ok_or(RelayError::NoStdout)?;
    let mut frames = FramedRead::new(stdout, MjpegCodec::new());

    let first = tokio::time::timeout(timeout, frames.next()).await;
    // Dropping the child at return kills it if still running.
    match first {
        Ok(Some(Ok(frame))) => {
            info!(size = frame.len(), "Frame captured");
            Ok(Snapshot::from_frame(&frame))
        }
        Ok(Some(Err(e))) => Err(RelayError::Stream(e)),
        Ok(None) => {
            let code = child.wait().await.ok().and_then(|s| s.code());
            warn!(?code, "Transcoder ended without a frame");
            Err(RelayError::NoFrame)
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "Frame capture timed out");
            Err(RelayError::SnapshotTimeout {
                secs: timeout.as_secs(),
            })
        }
    }
}
