//! Chunked sample rate conversion using rubato
//!
//! Converts interleaved stereo audio to 44.1kHz in fixed-size chunks so the
//! whole decoded source never needs to be held in memory.

use crate::audio::types::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per resampler call
pub const CHUNK_FRAMES: usize = 1024;

/// Streaming resampler for interleaved stereo f32 audio.
///
/// Feed decoded audio with [`push`](Self::push) as it arrives, then call
/// [`finish`](Self::finish) once to flush. The resampler's output delay is
/// discarded and the total output is trimmed to `round(frames_in * ratio)`,
/// so output length tracks source duration.
pub struct StatefulResampler {
    /// None when the source is already at the target rate
    inner: Option<FastFixedIn<f32>>,
    ratio: f64,
    /// Planar input not yet forming a full chunk
    pending: Vec<Vec<f32>>,
    frames_in: u64,
    frames_out: u64,
    delay_remaining: usize,
}

impl StatefulResampler {
    pub fn new(input_rate: u32) -> Result<Self> {
        if input_rate == 0 {
            return Err(Error::Decode("Invalid sample rate 0".to_string()));
        }

        let ratio = TARGET_SAMPLE_RATE as f64 / input_rate as f64;

        if input_rate == TARGET_SAMPLE_RATE {
            debug!("Sample rate already at {}Hz, skipping resample", TARGET_SAMPLE_RATE);
            return Ok(Self {
                inner: None,
                ratio,
                pending: Vec::new(),
                frames_in: 0,
                frames_out: 0,
                delay_remaining: 0,
            });
        }

        debug!("Resampling from {}Hz to {}Hz", input_rate, TARGET_SAMPLE_RATE);

        // Cubic interpolation, fixed regardless of source rate
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Cubic,
            CHUNK_FRAMES,
            TARGET_CHANNELS,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        let delay_remaining = resampler.output_delay();

        Ok(Self {
            inner: Some(resampler),
            ratio,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES); TARGET_CHANNELS],
            frames_in: 0,
            frames_out: 0,
            delay_remaining,
        })
    }

    /// Frames expected in total for the input consumed so far
    pub fn expected_output_frames(&self) -> u64 {
        (self.frames_in as f64 * self.ratio).round() as u64
    }

    /// Resample interleaved stereo input, appending interleaved output to `out`.
    pub fn push(&mut self, interleaved: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let frames = interleaved.len() / TARGET_CHANNELS;
        self.frames_in += frames as u64;

        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(&interleaved[..frames * TARGET_CHANNELS]);
            self.frames_out += frames as u64;
            return Ok(());
        };

        for frame in interleaved.chunks_exact(TARGET_CHANNELS) {
            for (ch, sample) in frame.iter().enumerate() {
                self.pending[ch].push(*sample);
            }
        }

        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            let planar = resampler
                .process(&chunk, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

            Self::emit(
                planar,
                &mut self.delay_remaining,
                &mut self.frames_out,
                None,
                out,
            );
        }

        Ok(())
    }

    /// Flush buffered input and the resampler tail.
    pub fn finish(&mut self, out: &mut Vec<f32>) -> Result<()> {
        let target = self.expected_output_frames();

        let Some(resampler) = self.inner.as_mut() else {
            return Ok(());
        };

        if !self.pending[0].is_empty() {
            let planar = resampler
                .process_partial(Some(self.pending.as_slice()), None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            for ch in self.pending.iter_mut() {
                ch.clear();
            }
            Self::emit(
                planar,
                &mut self.delay_remaining,
                &mut self.frames_out,
                Some(target),
                out,
            );
        }

        // Drain the delay line with silence until the expected length is reached
        let mut rounds = 0;
        while self.frames_out < target && rounds < 8 {
            let planar = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            Self::emit(
                planar,
                &mut self.delay_remaining,
                &mut self.frames_out,
                Some(target),
                out,
            );
            rounds += 1;
        }

        debug!(
            "Resampled {} input frames to {} output frames",
            self.frames_in, self.frames_out
        );
        Ok(())
    }

    /// Interleave planar output, skipping leading delay and capping at `limit`.
    fn emit(
        planar: Vec<Vec<f32>>,
        delay_remaining: &mut usize,
        frames_out: &mut u64,
        limit: Option<u64>,
        out: &mut Vec<f32>,
    ) {
        let available = planar.first().map(|ch| ch.len()).unwrap_or(0);
        let skip = (*delay_remaining).min(available);
        *delay_remaining -= skip;

        let mut end = available;
        if let Some(limit) = limit {
            let room = limit.saturating_sub(*frames_out) as usize;
            end = end.min(skip + room);
        }

        for frame_idx in skip..end {
            for ch in planar.iter() {
                out.push(ch[frame_idx]);
            }
        }
        *frames_out += (end.saturating_sub(skip)) as u64;
    }
}
