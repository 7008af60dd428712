//! Shared test utilities for soundboard-server integration tests

#![allow(dead_code)]

pub mod audio_generator;

use async_trait::async_trait;
use parking_lot::Mutex;
use soundboard_common::ControlMessage;
use soundboard_server::audio::{AssetKey, AudioSink, NullSink, PcmPlayer};
use soundboard_server::library::{AssetSource, SourceStream};
use soundboard_server::playback::{AssetCache, PlaybackController};
use soundboard_server::ws::{NotificationHub, SessionHandler, Subscription};
use soundboard_server::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Asset source backed by in-memory files.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Vec<u8>>>,
    opens: AtomicUsize,
    /// Simulated read latency, widens the window for concurrent loads
    open_delay: Mutex<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.files.lock().insert(name.to_string(), bytes);
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl AssetSource for MemorySource {
    fn resolve(&self, filename: &str) -> Option<AssetKey> {
        if filename.is_empty() || filename.contains('/') || filename == ".." {
            None
        } else {
            Some(AssetKey::new(filename))
        }
    }

    fn exists(&self, key: &AssetKey) -> bool {
        self.files.lock().contains_key(key.as_str())
    }

    fn open(&self, key: &AssetKey) -> Result<SourceStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let bytes = self.files.lock().get(key.as_str()).cloned().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", key),
            ))
        })?;
        Ok(SourceStream::from_bytes(bytes, key.extension().as_deref()))
    }
}

/// Sink wrapper that records how many players are open at once.
pub struct TrackingSink {
    inner: NullSink,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl TrackingSink {
    pub fn new(inner: NullSink) -> Self {
        Self {
            inner,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for TrackingSink {
    async fn open_player(&self) -> Result<Box<dyn PcmPlayer>> {
        let player = self.inner.open_player().await?;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(TrackedPlayer {
            inner: player,
            active: Arc::clone(&self.active),
        }))
    }
}

struct TrackedPlayer {
    inner: Box<dyn PcmPlayer>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl PcmPlayer for TrackedPlayer {
    async fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.inner.write(pcm).await
    }

    async fn drain(&mut self) -> Result<()> {
        self.inner.drain().await
    }
}

impl Drop for TrackedPlayer {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Playback core wired to an in-memory source and a paced null sink.
pub struct Harness {
    pub source: Arc<MemorySource>,
    pub null_sink: NullSink,
    pub sink: Arc<TrackingSink>,
    pub cache: Arc<AssetCache>,
    pub hub: Arc<NotificationHub>,
    pub controller: Arc<PlaybackController>,
}

impl Harness {
    /// `speed` scales playback pace (1.0 = real time, 0.0 = instant)
    pub fn new(speed: f64) -> Self {
        let source = Arc::new(MemorySource::new());
        let null_sink = NullSink::new(speed);
        let sink = Arc::new(TrackingSink::new(null_sink.clone()));
        let cache = Arc::new(AssetCache::new(source.clone()));
        let hub = Arc::new(NotificationHub::new(64));
        let controller = PlaybackController::new(cache.clone(), sink.clone(), Arc::clone(&hub));

        Self {
            source,
            null_sink,
            sink,
            cache,
            hub,
            controller,
        }
    }

    pub fn handler(&self, announce_stop_toggles: bool) -> SessionHandler {
        SessionHandler::new(
            self.source.clone(),
            Arc::clone(&self.controller),
            Arc::clone(&self.hub),
            announce_stop_toggles,
            Duration::from_secs(1),
        )
    }

    pub fn subscribe(&self) -> Subscription {
        self.controller.subscribe()
    }
}

/// Next message on a subscription, failing the test after 5 seconds
pub async fn recv(sub: &mut Subscription) -> ControlMessage {
    tokio::time::timeout(Duration::from_secs(5), sub.outbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("outbox closed")
}

/// Assert nothing arrives on a subscription for `ms` milliseconds
pub async fn assert_no_message(sub: &mut Subscription, ms: u64) {
    if let Ok(msg) = tokio::time::timeout(Duration::from_millis(ms), sub.outbox.recv()).await {
        panic!("unexpected message: {:?}", msg);
    }
}

/// Collect everything that arrives within `ms` milliseconds
pub async fn drain_for(sub: &mut Subscription, ms: u64) -> Vec<ControlMessage> {
    let mut out = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(ms);
    while let Ok(Some(msg)) = tokio::time::timeout_at(deadline, sub.outbox.recv()).await {
        out.push(msg);
    }
    out
}
