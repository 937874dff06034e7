use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Session already disposed")]
    UseAfterDispose,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: status={status}, message={message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
