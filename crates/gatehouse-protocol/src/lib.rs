//! Wire formats spoken by the gatehouse gateway.
//!
//! - [`Command`]: the flat `mode;<verb>;<uid>[;<extra>]` string published to
//!   both bus command topics.
//! - [`StatusMessage`]: the `{Mode, Status, Data}` JSON devices publish on
//!   their status topics, with [`StatusKind`] classification.
//! - [`FrameScanner`] and [`MjpegCodec`]: JPEG frame extraction from a
//!   transcoder's byte stream and multipart section encoding for HTTP.

pub mod codec;
pub mod command;
pub mod frame_scanner;
pub mod multipart;
pub mod status;

pub use codec::MjpegCodec;
pub use command::Command;
pub use frame_scanner::{DrainFrames, FrameScanner};
pub use multipart::{encode_part, part_header};
pub use status::{StatusKind, StatusMessage};
