//! Gateway-wide constants.
//!
//! Values here are shared by more than one crate: topic names agreed with the
//! bus devices, byte markers of the transcoder output, and the time windows
//! that the bridge, correlator and relay apply.
//!
//! # Bus topology
//!
//! ```text
//!                      ┌──> acs_front_command ──> Front device ──> acs_front_status ──┐
//! Correlator ──publish─┤                                                               ├──> Correlator
//!                      └──> acs_rear_command  ──> Rear device  ──> acs_rear_status  ──┘
//! ```
//!
//! The same payload goes to both command topics; there is no per-device
//! addressing.
//!
//! # Usage
//!
//! ```
//! use gatehouse_core::constants::*;
//!
//! assert_eq!(COMMAND_TOPICS.len(), 2);
//! assert_eq!(JPEG_START_MARKER, [0xFF, 0xD8]);
//! ```

// ============================================================================
// Terminal bridge
// ============================================================================

/// Seconds a connectivity check result stays valid.
///
/// Within this window an unforced check returns the cached result without
/// spawning a process.
pub const CONNECTION_CACHE_WINDOW_SECS: u64 = 60;

/// Multiplier applied to the device timeout to get the bridge's own
/// wall-clock limit.
///
/// The script's timeout bounds device I/O only. Interpreter startup and
/// scheduling are covered by the larger bridge limit.
///
/// ```
/// use gatehouse_core::constants::BRIDGE_TIMEOUT_MULTIPLIER;
///
/// let device_timeout = 5;
/// assert_eq!(device_timeout * BRIDGE_TIMEOUT_MULTIPLIER, 10);
/// ```
pub const BRIDGE_TIMEOUT_MULTIPLIER: u64 = 2;

/// Prefix marking the authoritative result line of a script.
///
/// Scripts that do not print it fall back to the last non-empty line.
pub const RESULT_SENTINEL: &str = "RESULT ";

/// Scripts the diagnostics call expects to find on disk.
pub const REQUIRED_SCRIPTS: [&str; 3] = ["test_connection", "create_user", "delete_user"];

/// Extension appended to script names.
pub const SCRIPT_EXTENSION: &str = "py";

/// Default terminal address.
pub const DEFAULT_TERMINAL_IP: &str = "192.168.1.201";

/// Default terminal port.
pub const DEFAULT_TERMINAL_PORT: u16 = 4370;

/// Default terminal password.
pub const DEFAULT_TERMINAL_PASSWORD: &str = "0";

/// Default device timeout in seconds.
pub const DEFAULT_TERMINAL_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Bus correlator
// ============================================================================

/// Command topic of the front device.
pub const FRONT_COMMAND_TOPIC: &str = "acs_front_command";

/// Command topic of the rear device.
pub const REAR_COMMAND_TOPIC: &str = "acs_rear_command";

/// Status topic of the front device.
pub const FRONT_STATUS_TOPIC: &str = "acs_front_status";

/// Status topic of the rear device.
pub const REAR_STATUS_TOPIC: &str = "acs_rear_status";

/// Every command is published to all of these.
pub const COMMAND_TOPICS: [&str; 2] = [FRONT_COMMAND_TOPIC, REAR_COMMAND_TOPIC];

/// Subscribed on every (re)connect.
pub const STATUS_TOPICS: [&str; 2] = [FRONT_STATUS_TOPIC, REAR_STATUS_TOPIC];

/// Leading field of every command string.
pub const COMMAND_PREFIX: &str = "mode";

/// Field separator of command strings.
pub const COMMAND_DELIMITER: char = ';';

/// Failure status for a uid the device does not hold.
pub const STATUS_UID_NOT_FOUND: &str = "uid not found";

/// Default caller timeout for a bus command, in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Delay before reconnecting after an unexpected broker disconnect.
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Keepalive interval negotiated with the broker.
pub const BROKER_KEEPALIVE_SECS: u64 = 60;

/// Interval between status feed pings.
pub const FEED_PING_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Stream relay
// ============================================================================

/// JPEG start-of-image marker.
pub const JPEG_START_MARKER: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const JPEG_END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Multipart boundary token.
pub const MULTIPART_BOUNDARY: &str = "frame";

/// Content type of the relay response.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Seconds between SIGTERM and SIGKILL when a client disconnects.
pub const TERMINATION_GRACE_SECS: u64 = 3;

/// Seconds allowed for a single-frame snapshot capture.
pub const SNAPSHOT_TIMEOUT_SECS: u64 = 10;

/// Default RTSP port.
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Default camera channel path segment.
pub const DEFAULT_RTSP_CHANNEL: &str = "101";
