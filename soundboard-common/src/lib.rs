//! # Soundboard Common Library
//!
//! Shared code for the soundboard service and its tooling:
//! - Wire protocol spoken over client connections (`ControlMessage`)
//! - Configuration file loading and folder resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::ControlMessage;
