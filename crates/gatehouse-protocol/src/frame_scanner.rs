//! JPEG frame scanner for transcoder output.
//!
//! The transcoder writes back-to-back JPEG images to its standard output with
//! no length prefix. Each image is delimited by its own markers:
//!
//! ```text
//! FF D8  <image data ...>  FF D9
//! SOI                      EOI
//! ```
//!
//! Pipe reads split that byte stream arbitrarily, so the scanner accumulates
//! chunks and only emits an image once both markers are in the buffer.
//!
//! # Usage
//!
//! ```
//! use gatehouse_protocol::FrameScanner;
//!
//! let mut scanner = FrameScanner::new();
//!
//! scanner.feed(&[0xFF, 0xD8, 0x01, 0x02]);
//! assert!(scanner.next_frame().is_none());
//!
//! scanner.feed(&[0x03, 0xFF, 0xD9]);
//! let frame = scanner.next_frame().unwrap();
//! assert_eq!(&frame[..], &[0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
//! ```

use bytes::{Buf, Bytes, BytesMut};
use gatehouse_core::constants::{JPEG_END_MARKER, JPEG_START_MARKER};
use std::collections::VecDeque;
use tracing::warn;

/// Buffer ceiling. Beyond this without a complete frame the stream is
/// considered corrupt and the buffer is reset.
const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024; // 8 MiB

/// Initial buffer capacity; one 640x480 frame at moderate quality.
const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Recommended initial capacity for the frame queue.
const INITIAL_FRAME_QUEUE_CAPACITY: usize = 4;

/// Stateful scanner turning arbitrary chunks into complete JPEG frames.
///
/// # Algorithm
///
/// After each [`feed()`](FrameScanner::feed):
///
/// ```text
/// cursor = 0
/// loop:
///     start = find(FF D8, from cursor)      none -> stop, keep buffer
///     end   = find(FF D9, from start + 2)   none -> stop, keep partial frame
///     emit buffer[start .. end + 2]
///     cursor = end + 2
/// drop buffer[.. cursor]
/// ```
///
/// The end-marker search starts strictly after the matched start marker, so
/// a second `FF D8` inside image data never shortens a frame. Bytes that
/// precede a start marker are dropped together with the frame that follows
/// them; a buffer holding only such bytes is retained until a frame completes
/// or the size ceiling is reached.
///
/// Output depends only on the concatenated bytes, never on how they were
/// chunked.
#[derive(Debug)]
pub struct FrameScanner {
    /// Unconsumed bytes; index 0 is the scan cursor.
    buffer: BytesMut,

    /// Complete frames ready for extraction.
    frames: VecDeque<Bytes>,

    /// Frames emitted since creation.
    frame_count: u64,

    /// Times the buffer hit the ceiling and was discarded.
    resets: u64,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frames: VecDeque::with_capacity(INITIAL_FRAME_QUEUE_CAPACITY),
            frame_count: 0,
            resets: 0,
        }
    }

    /// Append a chunk and extract every frame it completes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.scan();

        if self.buffer.len() > MAX_BUFFER_SIZE {
            warn!(
                buffered = self.buffer.len(),
                limit = MAX_BUFFER_SIZE,
                "frame buffer exceeded limit without a complete frame, discarding"
            );
            self.buffer.clear();
            self.resets += 1;
        }
    }

    /// Next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Number of frames ready for extraction.
    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes held back waiting for more data.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames emitted since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Times the buffer was discarded for exceeding the ceiling.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Discard buffered bytes and queued frames.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
    }

    /// Iterator over the frames currently queued.
    pub fn drain_frames(&mut self) -> DrainFrames<'_> {
        DrainFrames { scanner: self }
    }

    fn scan(&mut self) {
        let mut cursor = 0;

        while let Some((start, end)) = locate_frame(&self.buffer, cursor) {
            let frame = Bytes::copy_from_slice(&self.buffer[start..end]);
            self.frames.push_back(frame);
            self.frame_count += 1;
            cursor = end;
        }

        if cursor > 0 {
            self.buffer.advance(cursor);
        }
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the next complete frame at or after `from`.
///
/// Returns the half-open range `[start, end)` covering both markers.
fn locate_frame(buffer: &[u8], from: usize) -> Option<(usize, usize)> {
    let start = find_marker(buffer, from, JPEG_START_MARKER)?;
    let end = find_marker(buffer, start + JPEG_START_MARKER.len(), JPEG_END_MARKER)?;
    Some((start, end + JPEG_END_MARKER.len()))
}

fn find_marker(buffer: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(marker.len())
        .position(|window| window == marker.as_slice())
        .map(|offset| from + offset)
}

/// Iterator that drains frames from a [`FrameScanner`].
pub struct DrainFrames<'a> {
    scanner: &'a mut FrameScanner,
}

impl Iterator for DrainFrames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        self.scanner.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.scanner.frames_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainFrames<'_> {
    fn len(&self) -> usize {
        self.scanner.frames_available()
    }
}
