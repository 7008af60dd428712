//! Asset cache tests: reuse, single-flight, and retry after failure

mod helpers;

use helpers::audio_generator::sine_wav;
use helpers::MemorySource;
use soundboard_server::audio::AssetKey;
use soundboard_server::playback::AssetCache;
use soundboard_server::Error;
use std::sync::Arc;
use std::time::Duration;

fn cache_with(files: &[(&str, Vec<u8>)]) -> (Arc<MemorySource>, Arc<AssetCache>) {
    let source = Arc::new(MemorySource::new());
    for (name, bytes) in files {
        source.insert(name, bytes.clone());
    }
    let cache = Arc::new(AssetCache::new(source.clone()));
    (source, cache)
}

#[tokio::test]
async fn test_sequential_requests_decode_once() {
    let (_source, cache) = cache_with(&[("a.wav", sine_wav(22050, 1, 200, 440.0, 0.5))]);
    let key = AssetKey::new("a.wav");

    let first = cache.get_or_load(&key).await.unwrap();
    let second = cache.get_or_load(&key).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.pcm(), second.pcm());
    assert_eq!(cache.decode_count(), 1);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_single_flight() {
    let (source, cache) = cache_with(&[("a.wav", sine_wav(22050, 2, 300, 440.0, 0.5))]);
    source.set_open_delay(Duration::from_millis(100));
    let key = AssetKey::new("a.wav");

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move { cache.get_or_load(&key).await })
        })
        .collect();

    let mut assets = Vec::new();
    for task in tasks {
        assets.push(task.await.unwrap().unwrap());
    }

    assert_eq!(cache.decode_count(), 1);
    assert_eq!(source.opens(), 1);
    for asset in &assets[1..] {
        assert!(Arc::ptr_eq(&assets[0], asset));
    }
}

#[tokio::test]
async fn test_missing_source_is_not_cached() {
    let (source, cache) = cache_with(&[]);
    let key = AssetKey::new("late.wav");

    let result = cache.get_or_load(&key).await;
    assert!(matches!(result, Err(Error::Io(_))));
    assert!(cache.get(&key).is_none());
    assert!(cache.is_empty());

    // Retry succeeds once the file appears
    source.insert("late.wav", sine_wav(44100, 2, 100, 440.0, 0.5));
    let asset = cache.get_or_load(&key).await.unwrap();
    assert_eq!(asset.frames(), 4410);
    assert_eq!(cache.decode_count(), 2);
}

#[tokio::test]
async fn test_decode_failure_does_not_poison() {
    let (source, cache) = cache_with(&[("bad.wav", b"garbage".repeat(100))]);
    let key = AssetKey::new("bad.wav");

    assert!(matches!(cache.get_or_load(&key).await, Err(Error::Decode(_))));
    assert!(matches!(cache.get_or_load(&key).await, Err(Error::Decode(_))));
    assert_eq!(cache.decode_count(), 2);

    source.insert("bad.wav", sine_wav(44100, 1, 100, 440.0, 0.5));
    assert!(cache.get_or_load(&key).await.is_ok());
}

#[tokio::test]
async fn test_distinct_keys_decode_independently() {
    let (_source, cache) = cache_with(&[
        ("a.wav", sine_wav(44100, 2, 100, 440.0, 0.5)),
        ("b.wav", sine_wav(44100, 2, 200, 440.0, 0.5)),
    ]);

    let a = cache.get_or_load(&AssetKey::new("a.wav")).await.unwrap();
    let b = cache.get_or_load(&AssetKey::new("b.wav")).await.unwrap();

    assert_eq!(a.frames(), 4410);
    assert_eq!(b.frames(), 8820);
    assert_eq!(cache.decode_count(), 2);
}
