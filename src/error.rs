//! Error types for the arbor engine.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the arbor engine.
///
/// "Not found" conditions (missing node ids, stale selections) are never
/// errors; they are `Option`/`bool` returns on the component APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Snapshot construction rejected the payload (duplicate id, cycle).
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Transport-level failure on the stream channel.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A second exchange was started while one was still pending.
    #[error("Exchange already in progress for chat {chat_id}")]
    ExchangeInProgress { chat_id: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),

    /// HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] Box<reqwest::Error>),

    /// API errors (generic)
    #[error("API error: {0}")]
    Api(String),
}

impl Error {
    /// Create a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(Box::new(value))
    }
}
