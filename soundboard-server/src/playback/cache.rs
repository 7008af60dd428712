//! Decoded asset cache with single-flight loading
//!
//! Each key maps to a shared `OnceCell`. Concurrent first requests for the
//! same key all await the same cell, so only one decode runs. The map lock
//! guards membership only and is never held across the decode.

use crate::audio::decoder::decode_to_pcm_with;
use crate::audio::loudness::Loudness;
use crate::audio::types::{AssetKey, AudioAsset};
use crate::error::{Error, Result};
use crate::library::AssetSource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type Slot = Arc<OnceCell<Arc<AudioAsset>>>;

/// Process-lifetime cache of decoded assets. Never evicts.
pub struct AssetCache {
    source: Arc<dyn AssetSource>,
    slots: Mutex<HashMap<AssetKey, Slot>>,
    decodes: AtomicU64,
    loudness: Loudness,
}

impl AssetCache {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self::with_loudness(source, Loudness::default())
    }

    /// Cache whose decoded assets are level-adjusted by `loudness`
    pub fn with_loudness(source: Arc<dyn AssetSource>, loudness: Loudness) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            decodes: AtomicU64::new(0),
            loudness,
        }
    }

    /// Return the decoded asset for `key`, decoding it on first use.
    ///
    /// A failed load leaves no entry behind; the next request retries.
    pub async fn get_or_load(&self, key: &AssetKey) -> Result<Arc<AudioAsset>> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let result = slot
            .get_or_try_init(|| self.load(key.clone()))
            .await
            .map(Arc::clone);

        if result.is_err() {
            // Drop the empty slot unless a newer one replaced it
            let mut slots = self.slots.lock();
            if let Some(current) = slots.get(key) {
                if Arc::ptr_eq(current, &slot) && current.get().is_none() {
                    slots.remove(key);
                }
            }
        }

        result
    }

    /// Cached asset for `key`, if already decoded
    pub fn get(&self, key: &AssetKey) -> Option<Arc<AudioAsset>> {
        self.slots.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of decode operations started so far
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::SeqCst)
    }

    /// Number of fully decoded assets held
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn load(&self, key: AssetKey) -> Result<Arc<AudioAsset>> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        debug!("Decoding {}", key);

        let source = Arc::clone(&self.source);
        let task_key = key.clone();
        let loudness = self.loudness;
        let pcm = tokio::task::spawn_blocking(move || {
            let stream = source.open(&task_key)?;
            decode_to_pcm_with(stream, &loudness)
        })
        .await
        .map_err(|e| Error::Internal(format!("Decode task failed: {}", e)))?;

        match pcm {
            Ok(pcm) => {
                let asset = Arc::new(AudioAsset::new(key, pcm));
                info!(
                    "Cached {} ({} ms, {} bytes)",
                    asset.key(),
                    asset.duration_ms(),
                    asset.pcm().len()
                );
                Ok(asset)
            }
            Err(e) => {
                warn!("Failed to load {}: {}", key, e);
                Err(e)
            }
        }
    }
}
