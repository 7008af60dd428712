//! Notification hub
//!
//! Every connection owns a bounded outbox drained by exactly one writer
//! task, so delivery to a connection is FIFO and a slow client only ever
//! fills its own queue. Broadcasts never wait: a connection whose outbox is
//! full or closed is evicted and the rest still receive the message.

use crate::error::Error;
use parking_lot::Mutex;
use soundboard_common::ControlMessage;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0.simple())
    }
}

struct Connection {
    outbox: mpsc::Sender<ControlMessage>,
    cancel: CancellationToken,
}

/// Registered connections and broadcast fan-out.
pub struct NotificationHub {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    /// Parent of every connection token; cancelled on shutdown
    global_cancel: CancellationToken,
    outbox_capacity: usize,
    evicted_total: AtomicU64,
}

impl NotificationHub {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            global_cancel: CancellationToken::new(),
            outbox_capacity: outbox_capacity.max(1),
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Add a connection. Registering an id twice keeps the first entry.
    ///
    /// Returns `true` if the connection was newly added.
    pub fn register(
        &self,
        id: ConnectionId,
        outbox: mpsc::Sender<ControlMessage>,
        cancel: CancellationToken,
    ) -> bool {
        let mut connections = self.connections.lock();
        if connections.contains_key(&id) {
            return false;
        }
        connections.insert(id, Connection { outbox, cancel });
        info!("Connection registered: {} (total: {})", id, connections.len());
        true
    }

    /// Remove a connection. Unknown ids are ignored.
    ///
    /// Returns `true` if the connection was present.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock();
        if connections.remove(&id).is_some() {
            info!("Connection unregistered: {} (remaining: {})", id, connections.len());
            true
        } else {
            false
        }
    }

    /// Create and register a connection with a fresh outbox.
    ///
    /// The returned guard unregisters the connection when dropped.
    pub fn connect(self: &Arc<Self>) -> Subscription {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let cancel = self.global_cancel.child_token();
        self.register(id, tx, cancel.clone());

        Subscription {
            guard: ConnectionGuard {
                id,
                hub: Arc::clone(self),
            },
            outbox: rx,
            cancel,
        }
    }

    /// Queue `message` for every registered connection.
    ///
    /// Returns the number of connections the message was queued for.
    /// Connections that cannot accept it are evicted.
    pub fn broadcast(&self, message: &ControlMessage) -> usize {
        let mut connections = self.connections.lock();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, conn) in connections.iter() {
            match conn.outbox.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((*id, describe(&e))),
            }
        }

        for (id, reason) in failed {
            if let Some(conn) = connections.remove(&id) {
                self.record_eviction(id, &conn, &reason);
            }
        }

        debug!("Broadcast {} to {} connection(s)", message.type_name(), delivered);
        delivered
    }

    /// Queue `message` for one connection only.
    ///
    /// Returns `false` if the connection is unknown or was evicted.
    pub fn send_to(&self, id: ConnectionId, message: ControlMessage) -> bool {
        let mut connections = self.connections.lock();
        let Some(conn) = connections.get(&id) else {
            return false;
        };

        match conn.outbox.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                let reason = describe(&e);
                if let Some(conn) = connections.remove(&id) {
                    self.record_eviction(id, &conn, &reason);
                }
                false
            }
        }
    }

    /// Evict a connection after a failed or timed-out socket write.
    ///
    /// Returns `true` if the connection was still registered.
    pub fn evict(&self, id: ConnectionId, reason: &Error) -> bool {
        match self.connections.lock().remove(&id) {
            Some(conn) => {
                self.record_eviction(id, &conn, reason);
                true
            }
            None => false,
        }
    }

    fn record_eviction(&self, id: ConnectionId, conn: &Connection, reason: &Error) {
        conn.cancel.cancel();
        let total = self.evicted_total.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Evicted connection {}: {} (evicted total: {})", id, reason, total);
    }

    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Connections removed because they could not keep up or failed
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }

    /// Signal every connection to close. Used on shutdown.
    ///
    /// Returns the number of connections signalled.
    pub fn close_all(&self) -> usize {
        let count = self.connection_count();
        info!("Closing {} connection(s)", count);
        self.global_cancel.cancel();
        count
    }
}

fn describe(err: &TrySendError<ControlMessage>) -> Error {
    match err {
        TrySendError::Full(_) => Error::ConnectionWrite("outbox full".to_string()),
        TrySendError::Closed(_) => Error::ConnectionWrite("connection closed".to_string()),
    }
}

/// A registered connection: its guard, outbox receiver, and cancel token.
pub struct Subscription {
    pub guard: ConnectionGuard,
    pub outbox: mpsc::Receiver<ControlMessage>,
    pub cancel: CancellationToken,
}

/// RAII guard that unregisters a connection when dropped.
pub struct ConnectionGuard {
    id: ConnectionId,
    hub: Arc<NotificationHub>,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
