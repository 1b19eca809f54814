use thiserror::Error;

/// Errors that can occur while relaying camera frames
#[derive(Debug, Error)]
pub enum RelayError {
    /// Neither a stream URL nor a camera IP is configured
    #[error("Camera not configured: set RTSP_CAMERA_URL or RTSP_CAMERA_IP")]
    CameraNotConfigured,

    /// Transcoder could not be started
    #[error("Failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// Transcoder started without a readable stdout
    #[error("Transcoder stdout not available")]
    NoStdout,

    /// Reading or framing transcoder output failed
    #[error("Stream read error: {0}")]
    Stream(#[from] gatehouse_core::Error),

    /// Transcoder exited with a failure status on its own
    #[error("Transcoder exited with code {}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Exited { code: Option<i32> },

    /// Snapshot produced no frame before the deadline
    #[error("Frame capture timeout after {secs} seconds")]
    SnapshotTimeout { secs: u64 },

    /// Transcoder ended without emitting a complete frame
    #[error("No frame captured from camera")]
    NoFrame,
}

impl RelayError {
    /// Whether the error is a camera configuration problem rather than a
    /// runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RelayError::CameraNotConfigured)
    }
}

/// Specialized result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
