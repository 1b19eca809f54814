//! Shared vocabulary for the gatehouse device gateway.
//!
//! Every component (terminal bridge, bus correlator, stream relay) reports
//! its outcome as an [`OperationResult`], addresses people on devices by
//! [`Uid`], and names what it does with a [`Verb`]. The verb alone decides
//! which [`Transport`] carries an operation.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
