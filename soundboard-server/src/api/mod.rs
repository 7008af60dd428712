//! HTTP API
//!
//! REST endpoints for listing and uploading sounds, the WebSocket control
//! channel, and static file serving.

pub mod handlers;
pub mod server;

pub use server::{build_router, run, AppContext};
