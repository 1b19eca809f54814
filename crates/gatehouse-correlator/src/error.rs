use gatehouse_core::{BusVerb, OperationResult};
use thiserror::Error;

/// Errors that can occur while issuing bus commands
#[derive(Debug, Error)]
pub enum CorrelatorError {
    /// Broker connection is down
    #[error("MQTT client not connected")]
    NotConnected,

    /// Broker rejected or could not queue a publish
    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscription request failed
    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Disconnect request failed
    #[error("Failed to disconnect: {0}")]
    Disconnect(String),

    /// A newer command of the same verb took over the pending slot
    #[error("superseded by a newer {verb} command")]
    Superseded { verb: BusVerb },

    /// No terminal status arrived in time
    #[error("Command timed out after {ms} ms")]
    Timeout { ms: u64 },

    /// Completion was dropped without a result
    #[error("Command cancelled before completion")]
    Cancelled,

    /// Malformed command or status payload
    #[error("Protocol error: {0}")]
    Protocol(#[from] gatehouse_core::Error),
}

impl From<CorrelatorError> for OperationResult {
    fn from(err: CorrelatorError) -> Self {
        OperationResult::from_error(&err)
    }
}

/// Specialized result type for correlator operations
pub type CorrelatorResult<T> = Result<T, CorrelatorError>;
