//! Client connections: notification fan-out and the control protocol
//!
//! - [`NotificationHub`]: live connection set and non-blocking broadcast
//! - [`SessionHandler`]: per-connection read loop and message dispatch

pub mod hub;
pub mod session;

pub use hub::{ConnectionGuard, ConnectionId, NotificationHub, Subscription};
pub use session::{ws_handler, SessionHandler};
