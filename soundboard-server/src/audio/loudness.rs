//! Loudness adjustment for decoded assets
//!
//! Applied once per asset after quantization, so cached PCM already carries
//! the final level and playback needs no per-write scaling.

use crate::audio::types::BYTES_PER_SAMPLE;
use tracing::debug;

/// Full-scale reference for dBFS of 16-bit samples
const FULL_SCALE: f64 = 32768.0;

/// Level applied to every decoded asset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Loudness {
    /// Normalize each asset's RMS level to this dBFS before `gain_db`
    pub normalize_dbfs: Option<f32>,
    /// Fixed gain in dB (negative attenuates)
    pub gain_db: f32,
}

impl Loudness {
    pub fn new(normalize_dbfs: Option<f32>, gain_db: f32) -> Self {
        Self {
            normalize_dbfs,
            gain_db,
        }
    }

    /// True when applying this leaves PCM unchanged
    pub fn is_unity(&self) -> bool {
        self.normalize_dbfs.is_none() && self.gain_db == 0.0
    }

    /// Scale s16le PCM in place.
    ///
    /// Silent input is left untouched when normalizing. Scaled samples
    /// saturate at full scale.
    pub fn apply(&self, pcm: &mut [u8]) {
        if self.is_unity() {
            return;
        }

        let mut change_db = self.gain_db as f64;
        if let Some(target) = self.normalize_dbfs {
            let Some(current) = rms_dbfs(pcm) else {
                debug!("Skipping normalization of silent asset");
                return;
            };
            change_db += target as f64 - current;
        }

        let factor = 10f64.powf(change_db / 20.0);
        debug!("Applying {:.2} dB (x{:.4})", change_db, factor);

        for sample in pcm.chunks_exact_mut(BYTES_PER_SAMPLE) {
            let value = i16::from_le_bytes([sample[0], sample[1]]) as f64;
            let scaled = (value * factor).round().clamp(-32768.0, 32767.0) as i16;
            sample.copy_from_slice(&scaled.to_le_bytes());
        }
    }
}

/// RMS level of s16le PCM in dBFS, `None` for empty or silent input
pub fn rms_dbfs(pcm: &[u8]) -> Option<f64> {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for sample in pcm.chunks_exact(BYTES_PER_SAMPLE) {
        let value = i16::from_le_bytes([sample[0], sample[1]]) as f64;
        sum += value * value;
        count += 1;
    }

    if count == 0 || sum == 0.0 {
        return None;
    }
    let rms = (sum / count as f64).sqrt();
    Some(20.0 * (rms / FULL_SCALE).log10())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples_of(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_unity_leaves_pcm_untouched() {
        let mut pcm = pcm_of(&[1000, -2000, 32767]);
        let before = pcm.clone();
        Loudness::default().apply(&mut pcm);
        assert_eq!(pcm, before);
    }

    #[test]
    fn test_fixed_gain_scales_samples() {
        // -6.0206 dB halves the amplitude
        let mut pcm = pcm_of(&[10000, -10000, 0]);
        Loudness::new(None, -6.0206).apply(&mut pcm);
        let out = samples_of(&pcm);
        assert!((out[0] - 5000).abs() <= 1, "{:?}", out);
        assert!((out[1] + 5000).abs() <= 1, "{:?}", out);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn test_positive_gain_saturates() {
        let mut pcm = pcm_of(&[30000, -30000]);
        Loudness::new(None, 12.0).apply(&mut pcm);
        assert_eq!(samples_of(&pcm), vec![32767, -32768]);
    }

    #[test]
    fn test_normalize_reaches_target_level() {
        // Square wave at half scale: RMS = 16384, about -6 dBFS
        let mut pcm = pcm_of(&[16384, -16384].repeat(500));
        Loudness::new(Some(-30.0), 0.0).apply(&mut pcm);

        let level = rms_dbfs(&pcm).unwrap();
        assert!((level + 30.0).abs() < 0.05, "level {}", level);
    }

    #[test]
    fn test_normalize_then_gain() {
        let mut pcm = pcm_of(&[16384, -16384].repeat(500));
        Loudness::new(Some(-30.0), -6.0).apply(&mut pcm);

        let level = rms_dbfs(&pcm).unwrap();
        assert!((level + 36.0).abs() < 0.1, "level {}", level);
    }

    #[test]
    fn test_silence_is_not_normalized() {
        let mut pcm = vec![0u8; 64];
        Loudness::new(Some(-30.0), 6.0).apply(&mut pcm);
        assert!(pcm.iter().all(|&b| b == 0));
        assert_eq!(rms_dbfs(&pcm), None);
        assert_eq!(rms_dbfs(&[]), None);
    }
}
