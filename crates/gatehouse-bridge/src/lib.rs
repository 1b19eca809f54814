//! Subprocess RPC bridge to the legacy fingerprint/card terminal.
//!
//! The terminal is only reachable through vendor scripts. Each operation runs
//! one interpreter process, with the device connection parameters prepended
//! to the operation's arguments:
//!
//! ```text
//! python3 scripts/zkteco/create_user.py 192.168.1.201 4370 0 5 12 "Alice" EMP12 0
//!         └────────── script ─────────┘ └──── device ─────┘ └──── operation ────┘
//! ```
//!
//! # Architecture
//!
//! ```text
//! TerminalBridge
//!     │
//!     ├─> ConnectivityCache   (60 s, shared by every call)
//!     │
//!     └─> ScriptRunner ──spawn──> interpreter ──> vendor script ──> terminal
//!             │
//!             └─> interpret(): last line of stdout/stderr -> OperationResult
//! ```
//!
//! The runner enforces its own wall-clock limit of twice the device timeout
//! and kills the process when it expires. The cache lets mutating operations
//! skip the connectivity check while a recent result is available.
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_bridge::{BridgeConfig, NewTerminalUser, TerminalBridge};
//! use gatehouse_core::Uid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bridge = TerminalBridge::new(BridgeConfig::default().device_ip("10.0.0.7"));
//!
//! let outcome = bridge
//!     .create_user(&NewTerminalUser::new(Uid::new(12)?, "Alice", "EMP12"))
//!     .await;
//!
//! if let Some(creation) = outcome.creation {
//!     println!("requested {} got {}", creation.requested, creation.actual);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod runner;
pub mod terminal;

pub use cache::ConnectivityCache;
pub use config::{BridgeConfig, DeviceConfig};
pub use diagnostics::{DiagnosticsDetails, DiagnosticsReport};
pub use error::{BridgeError, BridgeResult};
pub use runner::{ScriptOutput, ScriptRunner, interpret, result_line};
pub use terminal::{CreateUserOutcome, EnrollMode, NewTerminalUser, TerminalBridge, UserCreation};
