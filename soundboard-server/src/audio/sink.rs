//! Audio sink abstraction
//!
//! An output task asks the sink for a [`PcmPlayer`], streams canonical PCM
//! bytes into it, then drains it. Dropping a player releases the output.

use crate::audio::types::{BYTES_PER_FRAME, TARGET_SAMPLE_RATE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Shared audio output that hands out players.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Acquire a player. May wait while another player holds the output.
    async fn open_player(&self) -> Result<Box<dyn PcmPlayer>>;
}

/// One clip's connection to the output.
#[async_trait]
pub trait PcmPlayer: Send {
    /// Write canonical PCM bytes; returns the number of bytes accepted.
    async fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    /// Wait until everything written has been played.
    async fn drain(&mut self) -> Result<()>;
}

/// Device-less sink that consumes PCM at real-time pace.
///
/// `speed` scales the pace: 1.0 is real time, 0.0 consumes instantly.
#[derive(Clone)]
pub struct NullSink {
    speed: f64,
    bytes_played: Arc<AtomicU64>,
    players_opened: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
}

impl NullSink {
    pub fn new(speed: f64) -> Self {
        Self {
            speed: speed.max(0.0),
            bytes_played: Arc::new(AtomicU64::new(0)),
            players_opened: Arc::new(AtomicU64::new(0)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Real-time sink for headless hosts
    pub fn realtime() -> Self {
        Self::new(1.0)
    }

    /// Total bytes accepted across all players
    pub fn bytes_played(&self) -> u64 {
        self.bytes_played.load(Ordering::Relaxed)
    }

    pub fn players_opened(&self) -> u64 {
        self.players_opened.load(Ordering::Relaxed)
    }

    /// Make every subsequent write fail, simulating a lost device
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for NullSink {
    async fn open_player(&self) -> Result<Box<dyn PcmPlayer>> {
        self.players_opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(NullPlayer {
            speed: self.speed,
            started: Instant::now(),
            written: 0,
            bytes_played: Arc::clone(&self.bytes_played),
            fail_writes: Arc::clone(&self.fail_writes),
        }))
    }
}

struct NullPlayer {
    speed: f64,
    started: Instant,
    written: u64,
    bytes_played: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
}

impl NullPlayer {
    /// Instant at which everything written so far would have finished playing
    fn play_deadline(&self) -> Instant {
        if self.speed <= 0.0 {
            return self.started;
        }
        let frames = self.written / BYTES_PER_FRAME as u64;
        let secs = frames as f64 / TARGET_SAMPLE_RATE as f64 / self.speed;
        self.started + Duration::from_secs_f64(secs)
    }
}

#[async_trait]
impl PcmPlayer for NullPlayer {
    async fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("Output device lost".to_string()));
        }
        // Pace writes so the clip takes as long as it would on a device
        tokio::time::sleep_until(self.play_deadline()).await;
        self.written += pcm.len() as u64;
        self.bytes_played.fetch_add(pcm.len() as u64, Ordering::Relaxed);
        Ok(pcm.len())
    }

    async fn drain(&mut self) -> Result<()> {
        tokio::time::sleep_until(self.play_deadline()).await;
        Ok(())
    }
}
