//! Audio pipeline: decode, resample, quantize, and output
//!
//! Every asset is normalized to one canonical PCM format (see [`types`]) so
//! the output side never needs to know about source formats.

pub mod decoder;
pub mod loudness;
pub mod output;
pub mod resampler;
pub mod sink;
pub mod types;

pub use decoder::{decode_to_pcm, decode_to_pcm_with, StreamDecoder};
pub use loudness::Loudness;
pub use output::AudioOutput;
pub use resampler::StatefulResampler;
pub use sink::{AudioSink, NullSink, PcmPlayer};
pub use types::{AssetKey, AudioAsset, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
