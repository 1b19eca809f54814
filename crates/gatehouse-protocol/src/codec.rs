//! Tokio codec between transcoder output and multipart sections.
//!
//! # Architecture
//!
//! ```text
//! transcoder stdout -> Decoder -> Bytes (one JPEG frame)
//! Bytes (frame)     -> Encoder -> multipart section
//! ```
//!
//! The decoder is a thin layer over [`FrameScanner`]; the encoder writes the
//! layout from [`crate::multipart`].
//!
//! # Usage with FramedRead
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use gatehouse_protocol::MjpegCodec;
//! use std::process::Stdio;
//! use tokio::process::Command;
//! use tokio_util::codec::FramedRead;
//!
//! # async fn example() -> gatehouse_core::Result<()> {
//! let mut child = Command::new("ffmpeg")
//!     .args(["-i", "rtsp://camera/stream", "-f", "image2pipe", "-vcodec", "mjpeg", "-"])
//!     .stdout(Stdio::piped())
//!     .spawn()?;
//!
//! if let Some(stdout) = child.stdout.take() {
//!     let mut frames = FramedRead::new(stdout, MjpegCodec::new());
//!     while let Some(frame) = frames.next().await {
//!         println!("frame of {} bytes", frame?.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::FrameScanner;
use crate::multipart::write_part;
use gatehouse_core::{Error, Result};

/// Default maximum frame size in bytes (4 MiB).
///
/// Frames at 640x480 are two orders of magnitude smaller; anything near this
/// is a corrupt stream.
const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Codec that decodes JPEG frames and encodes multipart sections.
#[derive(Debug)]
pub struct MjpegCodec {
    scanner: FrameScanner,
    max_frame_size: usize,
}

impl MjpegCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            scanner: FrameScanner::new(),
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Frames decoded so far.
    pub fn frame_count(&self) -> u64 {
        self.scanner.frame_count()
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size,
                max_size: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for MjpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MjpegCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            // The scanner owns every byte from here on.
            self.scanner.feed(src);
            src.clear();
        }

        match self.scanner.next_frame() {
            Some(frame) => {
                self.check_size(frame.len())?;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Bytes> for MjpegCodec {
    type Error = Error;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.check_size(frame.len())?;
        write_part(&frame, dst);
        Ok(())
    }
}
