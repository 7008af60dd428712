//! Common error types for the soundboard crates

use thiserror::Error;

/// Common result type for soundboard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the soundboard crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error in a configuration file
    #[error("Config file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
