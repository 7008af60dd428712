//! Audio decoder using symphonia
//!
//! Decodes MP3, WAV, OGG/Vorbis and FLAC packet by packet, mapping every
//! packet to interleaved stereo f32 before it reaches the resampler.

use crate::audio::loudness::Loudness;
use crate::audio::resampler::StatefulResampler;
use crate::audio::types::{append_pcm, TARGET_CHANNELS};
use crate::error::{Error, Result};
use crate::library::SourceStream;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Packet-at-a-time decoder producing interleaved stereo f32.
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    sample_buf: Option<(SampleBuffer<f32>, SignalSpec, usize)>,
    packets_skipped: u64,
}

impl StreamDecoder {
    /// Probe the byte source and prepare a decoder for its first audio track.
    ///
    /// # Errors
    /// - `Decode` when the container is not recognized, has no audio track,
    ///   or the codec is unsupported
    /// - `Io` when the byte source fails while being read
    pub fn open(source: SourceStream) -> Result<Self> {
        let mss = MediaSourceStream::new(source.reader, Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = source.extension.as_deref() {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| match e {
                // Running out of bytes means the input is too short to parse
                SymphoniaError::IoError(io) if io.kind() != std::io::ErrorKind::UnexpectedEof => {
                    Error::Io(io)
                }
                e => Error::Decode(format!("Failed to probe format: {}", e)),
            })?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Audio format: sample_rate={}, channels={:?}",
            sample_rate,
            track.codec_params.channels.map(|c| c.count())
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            sample_buf: None,
            packets_skipped: 0,
        })
    }

    /// Source sample rate (before resampling)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of corrupt packets skipped so far
    pub fn packets_skipped(&self) -> u64 {
        self.packets_skipped
    }

    /// Decode the next packet of the selected track.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream reset requested, treating as end of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::IoError(e)) => return Err(Error::Io(e)),
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    return Ok(None);
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    self.packets_skipped += 1;
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let capacity = decoded.capacity();

            let needs_new = match &self.sample_buf {
                Some((_, buf_spec, buf_cap)) => *buf_spec != spec || *buf_cap < capacity,
                None => true,
            };
            if needs_new {
                self.sample_buf = Some((SampleBuffer::new(capacity as u64, spec), spec, capacity));
            }

            let Some((buf, _, _)) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let channels = spec.channels.count();
            return Ok(Some(to_stereo(buf.samples(), channels)));
        }
    }
}

/// Map interleaved audio with any channel count to interleaved stereo.
///
/// Mono is duplicated to both sides. Wider layouts are downmixed: even
/// channel indices average into left, odd into right.
pub fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => {
            let left_count = n.div_ceil(2) as f32;
            let right_count = (n / 2) as f32;
            let mut out = Vec::with_capacity(samples.len() / n * TARGET_CHANNELS);
            for frame in samples.chunks_exact(n) {
                let mut left = 0.0;
                let mut right = 0.0;
                for (idx, s) in frame.iter().enumerate() {
                    if idx % 2 == 0 {
                        left += s;
                    } else {
                        right += s;
                    }
                }
                out.push(left / left_count);
                out.push(right / right_count);
            }
            out
        }
    }
}

/// Decode an encoded byte source to canonical PCM bytes.
///
/// Decodes, channel-maps, resamples and quantizes one packet at a time.
pub fn decode_to_pcm(source: SourceStream) -> Result<Vec<u8>> {
    decode_to_pcm_with(source, &Loudness::default())
}

/// [`decode_to_pcm`], then adjust the level of the finished PCM.
pub fn decode_to_pcm_with(source: SourceStream, loudness: &Loudness) -> Result<Vec<u8>> {
    let mut decoder = StreamDecoder::open(source)?;
    let mut resampler = StatefulResampler::new(decoder.sample_rate())?;

    let mut pcm = Vec::new();
    let mut resampled = Vec::new();

    while let Some(chunk) = decoder.next_chunk()? {
        resampled.clear();
        resampler.push(&chunk, &mut resampled)?;
        append_pcm(&mut pcm, &resampled);
    }

    resampled.clear();
    resampler.finish(&mut resampled)?;
    append_pcm(&mut pcm, &resampled);

    if decoder.packets_skipped() > 0 {
        warn!("Decode finished with {} corrupt packets skipped", decoder.packets_skipped());
    }
    debug!("Decoded {} PCM bytes", pcm.len());

    loudness.apply(&mut pcm);
    Ok(pcm)
}
