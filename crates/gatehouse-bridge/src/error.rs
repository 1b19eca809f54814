use gatehouse_core::OperationResult;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a script from producing a result.
///
/// A script that runs and exits non-zero is not an error at this level; its
/// output is interpreted into a failed [`OperationResult`] instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Script file is missing; nothing was spawned
    #[error("Script not found: {script} (looked in {})", .dir.display())]
    ScriptNotFound { script: String, dir: PathBuf },

    /// Interpreter could not be started
    #[error("Failed to execute script: {0}")]
    Spawn(#[source] std::io::Error),

    /// Waiting for the process or reading its output failed
    #[error("Failed to collect script output: {0}")]
    Wait(#[source] std::io::Error),

    /// Wall-clock limit expired; the process was killed
    #[error("Script execution timeout after {secs} seconds")]
    Timeout { secs: u64 },
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

impl From<BridgeError> for OperationResult {
    fn from(err: BridgeError) -> Self {
        OperationResult::from_error(&err)
    }
}

/// Specialized result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
