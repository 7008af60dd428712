//! Error types for soundboard-server
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for soundboard-server
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Audio decoding errors (malformed or unsupported encoded audio)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Byte source could not be opened or read
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Write to a client connection failed or timed out
    #[error("Connection write error: {0}")]
    ConnectionWrite(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<soundboard_common::Error> for Error {
    fn from(err: soundboard_common::Error) -> Self {
        match err {
            soundboard_common::Error::Io(e) => Error::Io(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using soundboard-server Error
pub type Result<T> = std::result::Result<T, Error>;
