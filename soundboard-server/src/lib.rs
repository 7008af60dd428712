//! Soundboard server library
//!
//! Playback coordination core (decode pipeline, asset cache, playback
//! controller, notification hub, session handler) plus the HTTP/WebSocket
//! surface that drives it. Exposed as a library so integration tests and
//! benchmarks can exercise the pieces directly.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod library;
pub mod playback;
pub mod ws;

pub use error::{Error, Result};
