//! Session handler: one read loop per client connection
//!
//! Inbound text frames are parsed as control messages. Anything that is
//! not a well-formed `play-sound` request is ignored without a reply.
//! Outbound messages go through the hub so every connection has a single
//! writer.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::library::AssetSource;
use crate::playback::{PlaybackController, ToggleOutcome};
use crate::ws::hub::{ConnectionId, NotificationHub, Subscription};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use soundboard_common::ControlMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reply sent when a requested file does not exist
pub const NOT_FOUND_MESSAGE: &str = "Sound file not found";

/// What a single inbound message led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Malformed or unknown message
    Ignored,
    /// Requested file does not exist; error sent to the requester
    NotFound,
    Toggled(ToggleOutcome),
    /// Load failed; error sent to the requester
    Failed,
}

/// Dispatches control messages from client connections.
#[derive(Clone)]
pub struct SessionHandler {
    library: Arc<dyn AssetSource>,
    controller: Arc<PlaybackController>,
    hub: Arc<NotificationHub>,
    /// Announce `sound-played` for toggles that stop a clip too
    announce_stop_toggles: bool,
    write_timeout: Duration,
}

impl SessionHandler {
    pub fn new(
        library: Arc<dyn AssetSource>,
        controller: Arc<PlaybackController>,
        hub: Arc<NotificationHub>,
        announce_stop_toggles: bool,
        write_timeout: Duration,
    ) -> Self {
        Self {
            library,
            controller,
            hub,
            announce_stop_toggles,
            write_timeout,
        }
    }

    /// Register a new client; it is sent the keys currently playing.
    pub fn subscribe(&self) -> Subscription {
        self.controller.subscribe()
    }

    /// Handle one inbound text frame from connection `conn`.
    pub async fn handle_message(&self, conn: ConnectionId, text: &str) -> MessageOutcome {
        let Some(filename) = ControlMessage::parse_play_request(text) else {
            debug!("Ignoring message from {}: {:.80}", conn, text);
            return MessageOutcome::Ignored;
        };

        let key = match self.library.resolve(&filename) {
            Some(key) if self.library.exists(&key) => key,
            _ => {
                info!("{} requested missing sound {:?}", conn, filename);
                self.hub.send_to(conn, ControlMessage::error(NOT_FOUND_MESSAGE));
                return MessageOutcome::NotFound;
            }
        };

        let hub = &self.hub;
        let announce_all = self.announce_stop_toggles;
        let announce = |outcome: ToggleOutcome| {
            if announce_all || outcome == ToggleOutcome::Started {
                hub.broadcast(&ControlMessage::sound_played(filename.as_str()));
            }
        };

        match self.controller.toggle_with(&key, announce).await {
            Ok(outcome) => MessageOutcome::Toggled(outcome),
            Err(e) => {
                warn!("Failed to play {}: {}", filename, e);
                self.hub.send_to(
                    conn,
                    ControlMessage::error(format!("Failed to play sound: {}", e)),
                );
                MessageOutcome::Failed
            }
        }
    }

    /// Drive one WebSocket until the client leaves or is evicted.
    pub async fn run(&self, socket: WebSocket) {
        let (sender, mut receiver) = socket.split();
        let Subscription {
            guard,
            outbox,
            cancel,
        } = self.subscribe();
        let id = guard.id();
        info!("Client connected: {}", id);

        let writer = tokio::spawn(write_loop(
            sender,
            outbox,
            cancel.clone(),
            Arc::clone(&self.hub),
            id,
            self.write_timeout,
        ));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connection {} cancelled", id);
                    break;
                }
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_message(id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Binary, ping and pong frames carry no commands
                    Some(Ok(_)) => {}
                }
            }
        }

        drop(guard);
        cancel.cancel();
        if let Err(e) = writer.await {
            warn!("Writer for {} ended abnormally: {}", id, e);
        }
        info!("Client disconnected: {}", id);
    }
}

/// Single writer for one connection: drains the outbox onto the socket.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<ControlMessage>,
    cancel: CancellationToken,
    hub: Arc<NotificationHub>,
    id: ConnectionId,
    write_timeout: Duration,
) {
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = outbox.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {}: {}", message.type_name(), e);
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, sender.send(Message::Text(json))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                hub.evict(id, &Error::ConnectionWrite(format!("write failed: {}", e)));
                break;
            }
            Err(_) => {
                hub.evict(
                    id,
                    &Error::ConnectionWrite(format!("write timed out after {:?}", write_timeout)),
                );
                break;
            }
        }
    }

    let _ = tokio::time::timeout(write_timeout, sender.close()).await;
}

/// GET /ws - upgrade to the control protocol
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    let handler = ctx.sessions.clone();
    ws.on_upgrade(move |socket| async move { handler.run(socket).await })
}
