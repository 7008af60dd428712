//! Playback controller
//!
//! Per-key state machine toggling a clip between idle and playing.
//!
//! **Locking discipline:** one mutex guards the session map. A toggle
//! reserves the key's session before releasing the lock to load audio, and
//! an output task removes its own session and broadcasts `sound-stopped`
//! under that same lock. Session creation and retirement for a key are
//! therefore a single critical section, so two output tasks can never exist
//! for one key. The lock is never held across decoding or sink writes.

use crate::audio::sink::AudioSink;
use crate::audio::types::{AssetKey, AudioAsset};
use crate::error::{Error, Result};
use crate::playback::cache::AssetCache;
use crate::ws::hub::{NotificationHub, Subscription};
use parking_lot::Mutex;
use soundboard_common::ControlMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bytes handed to the sink per write
pub const WRITE_CHUNK_BYTES: usize = 4096;

/// Result of a successful toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The key was idle and is now playing
    Started,
    /// The key was playing; its output task has been asked to stop
    Stopping,
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    /// Stop requested, output task not yet retired
    Stopping,
}

/// Why an output task ended
#[derive(Debug)]
enum SessionEnd {
    Completed,
    Stopped,
    SinkFailed(Error),
}

/// Exists only while a key is playing.
struct PlaybackSession {
    id: u64,
    cancel: CancellationToken,
    /// Set once by whichever toggle requests the stop
    stopping: AtomicBool,
    /// Cancelled after the session has been removed and announced
    retired: CancellationToken,
    /// Set together with the start announcement; `None` while loading
    task: Option<JoinHandle<()>>,
}

enum Decision {
    Start {
        id: u64,
        cancel: CancellationToken,
        retired: CancellationToken,
    },
    Stopping,
    WaitForRetirement(CancellationToken),
}

/// Owns every playback session and its output task.
pub struct PlaybackController {
    sessions: Mutex<HashMap<AssetKey, PlaybackSession>>,
    cache: Arc<AssetCache>,
    sink: Arc<dyn AudioSink>,
    hub: Arc<NotificationHub>,
    next_id: AtomicU64,
}

impl PlaybackController {
    pub fn new(
        cache: Arc<AssetCache>,
        sink: Arc<dyn AudioSink>,
        hub: Arc<NotificationHub>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            cache,
            sink,
            hub,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Toggle playback for `key`.
    ///
    /// Idle keys are loaded (decoding on first use) and started. Playing keys
    /// are asked to stop without waiting for the output task to unwind. A key
    /// whose stop is already in progress is awaited until it retires, then
    /// started again.
    ///
    /// # Errors
    /// Load failures (`Decode`, `Io`) are returned; the key stays idle.
    pub async fn toggle(self: &Arc<Self>, key: &AssetKey) -> Result<ToggleOutcome> {
        self.toggle_with(key, |_| {}).await
    }

    /// Toggle, running `on_toggled` inside the session critical section.
    ///
    /// Anything `on_toggled` broadcasts is ordered before the session's
    /// eventual `sound-stopped`. It must not block or call back into the
    /// controller.
    pub async fn toggle_with<F>(self: &Arc<Self>, key: &AssetKey, on_toggled: F) -> Result<ToggleOutcome>
    where
        F: Fn(ToggleOutcome) + Send + Sync,
    {
        loop {
            match self.decide(key, &on_toggled) {
                Decision::Stopping => {
                    info!("Stopping {}", key);
                    return Ok(ToggleOutcome::Stopping);
                }
                Decision::WaitForRetirement(retired) => {
                    debug!("{} is stopping, waiting for it to retire", key);
                    retired.cancelled().await;
                }
                Decision::Start {
                    id,
                    cancel,
                    retired,
                } => {
                    return self.start(key, id, cancel, retired, &on_toggled).await;
                }
            }
        }
    }

    /// Inspect the session map and either reserve a new session or stop
    /// the existing one, in one lock scope.
    fn decide<F>(&self, key: &AssetKey, on_toggled: &F) -> Decision
    where
        F: Fn(ToggleOutcome),
    {
        let mut sessions = self.sessions.lock();

        if let Some(session) = sessions.get(key) {
            if session.stopping.swap(true, Ordering::SeqCst) {
                return Decision::WaitForRetirement(session.retired.clone());
            }
            session.cancel.cancel();
            on_toggled(ToggleOutcome::Stopping);
            return Decision::Stopping;
        }

        let session = PlaybackSession {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            retired: CancellationToken::new(),
            task: None,
        };
        let decision = Decision::Start {
            id: session.id,
            cancel: session.cancel.clone(),
            retired: session.retired.clone(),
        };
        sessions.insert(key.clone(), session);
        decision
    }

    async fn start<F>(
        self: &Arc<Self>,
        key: &AssetKey,
        id: u64,
        cancel: CancellationToken,
        retired: CancellationToken,
        on_toggled: &F,
    ) -> Result<ToggleOutcome>
    where
        F: Fn(ToggleOutcome) + Send + Sync,
    {
        let asset = match self.cache.get_or_load(key).await {
            Ok(asset) => asset,
            Err(e) => {
                self.abandon(key, id);
                retired.cancel();
                return Err(e);
            }
        };

        info!("Playing {} ({} ms)", key, asset.duration_ms());

        // Spawn under the lock so retirement cannot run before the handle
        // is stored and the start is announced
        let mut sessions = self.sessions.lock();
        let controller = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            controller.run_session(task_key, id, asset, cancel, retired).await;
        });

        match sessions.get_mut(key) {
            Some(session) if session.id == id => session.task = Some(handle),
            _ => warn!("Reservation for {} vanished during load", key),
        }
        on_toggled(ToggleOutcome::Started);

        Ok(ToggleOutcome::Started)
    }

    /// Remove a reservation whose load failed.
    fn abandon(&self, key: &AssetKey, id: u64) {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get(key) else {
            return;
        };
        if session.id != id {
            return;
        }
        let was_stopping = session.stopping.load(Ordering::SeqCst);
        sessions.remove(key);

        // A stop toggle already announced this key; close it out for observers
        if was_stopping {
            self.hub.broadcast(&ControlMessage::sound_stopped(key.as_str()));
        }
    }

    /// Output task body. Streams the asset, then retires the session.
    async fn run_session(
        self: Arc<Self>,
        key: AssetKey,
        id: u64,
        asset: Arc<AudioAsset>,
        cancel: CancellationToken,
        retired: CancellationToken,
    ) {
        match self.stream_asset(&asset, &cancel).await {
            SessionEnd::Completed => info!("Finished {}", key),
            SessionEnd::Stopped => info!("Stopped {}", key),
            SessionEnd::SinkFailed(e) => error!("Playback of {} failed: {}", key, e),
        }

        {
            let mut sessions = self.sessions.lock();
            if sessions.get(&key).map(|s| s.id) == Some(id) {
                sessions.remove(&key);
            } else {
                warn!("Session {} for {} already gone at retirement", id, key);
            }
            self.hub.broadcast(&ControlMessage::sound_stopped(key.as_str()));
        }

        retired.cancel();
    }

    /// Copy PCM to a player until exhausted, cancelled, or the sink fails.
    /// The player is dropped on return, releasing the output.
    async fn stream_asset(&self, asset: &AudioAsset, cancel: &CancellationToken) -> SessionEnd {
        let mut player = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            player = self.sink.open_player() => match player {
                Ok(player) => player,
                Err(e) => return SessionEnd::SinkFailed(e),
            },
        };

        for chunk in asset.pcm().chunks(WRITE_CHUNK_BYTES) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Stopped,
                written = player.write(chunk) => {
                    if let Err(e) = written {
                        return SessionEnd::SinkFailed(e);
                    }
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => SessionEnd::Stopped,
            drained = player.drain() => match drained {
                Ok(()) => SessionEnd::Completed,
                Err(e) => SessionEnd::SinkFailed(e),
            },
        }
    }

    /// Current state of `key`
    pub fn state(&self, key: &AssetKey) -> PlaybackState {
        match self.sessions.lock().get(key) {
            None => PlaybackState::Idle,
            Some(s) if s.stopping.load(Ordering::SeqCst) => PlaybackState::Stopping,
            Some(_) => PlaybackState::Playing,
        }
    }

    /// Keys with a live session, sorted
    pub fn playing_keys(&self) -> Vec<AssetKey> {
        let mut keys: Vec<AssetKey> = self.sessions.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a client with the hub and queue `sound-played` for every
    /// key currently playing.
    ///
    /// Runs under the session lock, so the snapshot can never be delivered
    /// after the `sound-stopped` of a key it lists. Reservations still
    /// loading are left out; their start is broadcast to this client once
    /// the load succeeds.
    pub fn subscribe(&self) -> Subscription {
        let sessions = self.sessions.lock();
        let subscription = self.hub.connect();
        let id = subscription.guard.id();

        let mut keys: Vec<&AssetKey> = sessions
            .iter()
            .filter(|(_, session)| session.task.is_some())
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        for key in keys {
            if !self.hub.send_to(id, ControlMessage::sound_played(key.as_str())) {
                break;
            }
        }
        subscription
    }

    /// Cancel every session and wait for each one to retire.
    ///
    /// Reservations still loading are awaited too: they start already
    /// cancelled, or are abandoned if the load fails.
    pub async fn stop_all(&self) {
        let pending: Vec<(Option<JoinHandle<()>>, CancellationToken)> = {
            let mut sessions = self.sessions.lock();
            sessions
                .values_mut()
                .map(|session| {
                    session.stopping.store(true, Ordering::SeqCst);
                    session.cancel.cancel();
                    (session.task.take(), session.retired.clone())
                })
                .collect()
        };

        info!("Stopping {} playback session(s)", pending.len());
        for (task, retired) in pending {
            match task {
                Some(handle) => {
                    if let Err(e) = handle.await {
                        warn!("Output task ended abnormally: {}", e);
                    }
                }
                None => retired.cancelled().await,
            }
        }
    }
}
