//! # Gatehouse Relay
//!
//! Re-streams an RTSP camera to HTTP clients as `multipart/x-mixed-replace`
//! MJPEG, with one transcoder process per client.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  RTSP   ┌──────────────┐ stdout ┌───────────────┐ sections ┌────────────┐
//! │   Camera   │────────>│  transcoder  │───────>│ StreamSession │─────────>│ HTTP body  │
//! └────────────┘         │  (ffmpeg)    │ JPEGs  │ + MjpegCodec  │  mpsc    │ (client)   │
//!                        └──────────────┘        └───────────────┘          └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_relay::{CameraConfig, RelayConfig, StreamRelay};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let relay = StreamRelay::new(
//!     RelayConfig::default(),
//!     CameraConfig::default().ip("192.168.1.64").credentials("admin", "secret"),
//! );
//!
//! let mut sections = relay.start()?;
//! while let Some(section) = sections.recv().await {
//!     let _bytes = section?;
//! }
//!
//! let snapshot = relay.capture_frame().await?;
//! println!("{} bytes", snapshot.size);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod sink;
pub mod snapshot;

pub use config::{CameraConfig, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use session::{SessionEnd, SessionSummary, StreamSession};
pub use sink::{GuardedSink, Outbound};
pub use snapshot::{Snapshot, capture};

use bytes::Bytes;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::info;

/// Camera relay entry point shared by all clients.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    config: RelayConfig,
    camera: CameraConfig,
}

impl StreamRelay {
    pub fn new(config: RelayConfig, camera: CameraConfig) -> Self {
        Self { config, camera }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraConfig {
        &self.camera
    }

    /// Whether a camera source is configured.
    pub fn is_configured(&self) -> bool {
        self.camera.rtsp_url().is_ok()
    }

    fn transcoder(&self, args: Vec<String>) -> Command {
        let mut command = Command::new(&self.config.ffmpeg_path);
        command.args(args);
        command
    }

    /// Spawn a transcoder for one client.
    pub fn open(&self) -> RelayResult<StreamSession> {
        let url = self.camera.rtsp_url()?;
        let command = self.transcoder(self.config.stream_args(&url));
        StreamSession::spawn(command, self.config.termination_grace)
    }

    /// Start a session in the background and return the client's section
    /// channel. Dropping the receiver stops the transcoder.
    ///
    /// # Errors
    /// Configuration and spawn failures are reported before any byte is
    /// sent, so callers can still answer with an error status.
    pub fn start(&self) -> RelayResult<mpsc::Receiver<RelayResult<Bytes>>> {
        let session = self.open()?;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));

        tokio::spawn(async move {
            let summary = session.run(tx).await;
            info!(
                end = ?summary.end,
                frames = summary.frames,
                sections = summary.sections,
                forced_kill = summary.forced_kill,
                "Stream session ended"
            );
        });

        Ok(rx)
    }

    /// Grab one frame from the camera.
    pub async fn capture_frame(&self) -> RelayResult<Snapshot> {
        let url = self.camera.rtsp_url()?;
        let command = self.transcoder(self.config.snapshot_args(&url));
        capture(command, self.config.snapshot_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_camera_fails_before_spawn() {
        let relay = StreamRelay::new(RelayConfig::default(), CameraConfig::default());
        assert!(!relay.is_configured());
        assert!(matches!(relay.start(), Err(RelayError::CameraNotConfigured)));
        assert!(matches!(
            relay.capture_frame().await,
            Err(RelayError::CameraNotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let relay = StreamRelay::new(
            RelayConfig::default().ffmpeg_path("/nonexistent/ffmpeg-binary"),
            CameraConfig::from_url("rtsp://127.0.0.1/none"),
        );
        assert!(matches!(relay.start(), Err(RelayError::Spawn(_))));
    }
}
