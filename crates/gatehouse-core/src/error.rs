use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identity errors
    #[error("Invalid uid: {0}")]
    InvalidUid(String),

    // Wire format errors
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Unknown verb: {0}")]
    UnknownVerb(String),

    #[error("Invalid status message: {0}")]
    InvalidStatus(String),

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
