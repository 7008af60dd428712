//! Canonical PCM format and asset types

use std::fmt;

/// Output sample rate for all cached audio
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Output channel count (interleaved L, R)
pub const TARGET_CHANNELS: usize = 2;

/// Bytes per sample (signed 16-bit little-endian)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per interleaved stereo frame
pub const BYTES_PER_FRAME: usize = TARGET_CHANNELS * BYTES_PER_SAMPLE;

/// Opaque identifier of one uploaded audio source.
///
/// Produced by an asset source's `resolve`; stable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey(String);

impl AssetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase file extension, used as a probe hint
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded audio in canonical format.
///
/// Immutable after construction; shared between concurrent playbacks via `Arc`.
#[derive(Debug)]
pub struct AudioAsset {
    key: AssetKey,
    pcm: Vec<u8>,
}

impl AudioAsset {
    pub fn new(key: AssetKey, pcm: Vec<u8>) -> Self {
        Self { key, pcm }
    }

    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    /// Interleaved s16le stereo bytes at 44.1kHz
    pub fn pcm(&self) -> &[u8] {
        &self.pcm
    }

    pub fn frames(&self) -> usize {
        self.pcm.len() / BYTES_PER_FRAME
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames() as u64 * 1000 / TARGET_SAMPLE_RATE as u64
    }
}

/// Convert a normalized float sample to a signed 16-bit integer.
///
/// Rounds to nearest and saturates at full scale. NaN maps to 0.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Append quantized little-endian samples to a byte buffer
pub fn append_pcm(out: &mut Vec<u8>, samples: &[f32]) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for &s in samples {
        out.extend_from_slice(&quantize(s).to_le_bytes());
    }
}
