//! Playback coordination
//!
//! [`AssetCache`] turns asset keys into decoded audio exactly once;
//! [`PlaybackController`] owns the per-key play/stop state machine and the
//! output tasks.

pub mod cache;
pub mod controller;

pub use cache::AssetCache;
pub use controller::{PlaybackController, PlaybackState, ToggleOutcome};
