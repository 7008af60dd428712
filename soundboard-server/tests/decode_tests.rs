//! Decode pipeline tests: length, channel mapping, and error taxonomy

mod helpers;

use helpers::audio_generator::{silent_wav, sine_wav};
use soundboard_server::audio::loudness::rms_dbfs;
use soundboard_server::audio::{decode_to_pcm, decode_to_pcm_with, Loudness};
use soundboard_server::audio::resampler::CHUNK_FRAMES;
use soundboard_server::library::SourceStream;
use soundboard_server::Error;

const TARGET_BYTES_PER_SECOND: i64 = 44100 * 2 * 2;
const CHUNK_TOLERANCE_BYTES: i64 = CHUNK_FRAMES as i64 * 4;

fn decode(bytes: Vec<u8>) -> soundboard_server::Result<Vec<u8>> {
    decode_to_pcm(SourceStream::from_bytes(bytes, Some("wav")))
}

fn samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_one_second_mono_22050_upsamples_to_target_length() {
    let pcm = decode(sine_wav(22050, 1, 1000, 440.0, 0.5)).unwrap();

    let diff = (pcm.len() as i64 - TARGET_BYTES_PER_SECOND).abs();
    assert!(
        diff <= CHUNK_TOLERANCE_BYTES,
        "expected ~{} bytes, got {}",
        TARGET_BYTES_PER_SECOND,
        pcm.len()
    );
    assert_eq!(pcm.len() % 4, 0, "PCM must be whole stereo frames");
}

#[test]
fn test_48k_stereo_downsamples_to_target_length() {
    let pcm = decode(sine_wav(48000, 2, 500, 440.0, 0.5)).unwrap();

    let diff = (pcm.len() as i64 - TARGET_BYTES_PER_SECOND / 2).abs();
    assert!(diff <= CHUNK_TOLERANCE_BYTES, "got {} bytes", pcm.len());
}

#[test]
fn test_target_rate_stereo_is_sample_exact() {
    let pcm = decode(sine_wav(44100, 2, 1000, 440.0, 0.5)).unwrap();
    assert_eq!(pcm.len() as i64, TARGET_BYTES_PER_SECOND);

    // 0.5 amplitude survives the float round trip within a step
    let peak = samples(&pcm).iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!((16380..=16386).contains(&peak), "peak {}", peak);
}

#[test]
fn test_mono_is_duplicated_to_both_channels() {
    let pcm = decode(sine_wav(44100, 1, 100, 440.0, 0.5)).unwrap();
    let s = samples(&pcm);
    assert!(!s.is_empty());
    for frame in s.chunks_exact(2) {
        assert_eq!(frame[0], frame[1]);
    }
}

#[test]
fn test_six_channels_downmix_to_stereo() {
    let pcm = decode(sine_wav(44100, 6, 200, 440.0, 0.5)).unwrap();

    // 200 ms at 44.1kHz, two output channels
    assert_eq!(pcm.len(), 8820 * 4);
    for frame in samples(&pcm).chunks_exact(2) {
        assert!((frame[0] as i32 - frame[1] as i32).abs() <= 1);
    }
}

#[test]
fn test_silence_stays_silent() {
    let pcm = decode(silent_wav(22050, 2, 300)).unwrap();
    assert!(samples(&pcm).iter().all(|&s| s == 0));
}

#[test]
fn test_unparseable_bytes_are_decode_error() {
    let result = decode(b"definitely not a wav file, just text".repeat(64));
    assert!(matches!(result, Err(Error::Decode(_))), "got {:?}", result.map(|p| p.len()));
}

#[test]
fn test_empty_source_is_decode_error() {
    assert!(matches!(decode(Vec::new()), Err(Error::Decode(_))));
}

#[test]
fn test_normalized_decode_hits_target_level() {
    let wav = sine_wav(22050, 1, 500, 440.0, 0.9);
    let loudness = Loudness::new(Some(-30.0), 0.0);
    let pcm = decode_to_pcm_with(SourceStream::from_bytes(wav.clone(), Some("wav")), &loudness).unwrap();

    let level = rms_dbfs(&pcm).unwrap();
    assert!((level + 30.0).abs() < 0.1, "level {}", level);

    // Level adjustment never changes the length
    assert_eq!(pcm.len(), decode(wav).unwrap().len());
}

#[test]
fn test_playback_gain_attenuates() {
    let wav = sine_wav(44100, 2, 200, 440.0, 0.5);
    let plain = decode(wav.clone()).unwrap();
    let quiet = decode_to_pcm_with(
        SourceStream::from_bytes(wav, Some("wav")),
        &Loudness::new(None, -9.0),
    )
    .unwrap();

    let drop = rms_dbfs(&plain).unwrap() - rms_dbfs(&quiet).unwrap();
    assert!((drop - 9.0).abs() < 0.05, "drop {}", drop);
}
