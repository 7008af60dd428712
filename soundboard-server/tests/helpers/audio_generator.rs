//! In-memory WAV fixtures
//!
//! Deterministic sine and silence clips with known rate, channel count and
//! duration, encoded with hound so the decoder sees real container bytes.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Encode a 16-bit WAV sine clip. Every channel carries the same wave.
pub fn sine_wav(
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav header");
        let frames = sample_rate as u64 * duration_ms / 1000;

        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * PI * frequency_hz * t).sin() * amplitude;
            let sample = (value * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).expect("wav sample");
            }
        }

        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}

/// Encode a silent 16-bit WAV clip
pub fn silent_wav(sample_rate: u32, channels: u16, duration_ms: u64) -> Vec<u8> {
    sine_wav(sample_rate, channels, duration_ms, 0.0, 0.0)
}
