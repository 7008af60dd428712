//! Audio output using cpal
//!
//! Owns the single physical output. The cpal stream runs on a dedicated
//! thread (streams are not `Send`) and pulls i16 samples from a ring buffer.
//! Players take turns on the single output voice in FIFO order.

use crate::audio::sink::{AudioSink, PcmPlayer};
use crate::audio::types::{BYTES_PER_SAMPLE, TARGET_CHANNELS, TARGET_SAMPLE_RATE};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// Sleep between attempts when the ring buffer is full or draining
const BACKPRESSURE_SLEEP: Duration = Duration::from_millis(5);

/// How long a new player waits for the previous player's flush
const FLUSH_WAIT: Duration = Duration::from_millis(250);

/// Extra time allowed for a drain beyond the buffered audio duration
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// State shared with the audio callback
#[derive(Default)]
struct OutputShared {
    /// Set by a dropped player; the callback discards buffered samples
    flush: AtomicBool,
    /// Set by the stream error callback
    error: AtomicBool,
    /// Callbacks that ran dry while samples were still arriving
    underruns: AtomicU64,
}

/// Audio output manager using cpal.
pub struct AudioOutput {
    device_name: String,
    shared: Arc<OutputShared>,
    producer: Arc<Mutex<HeapProd<i16>>>,
    capacity_samples: usize,
    voice: Arc<Semaphore>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// List available audio output devices.
    ///
    /// Used by GET /api/audio/devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device and start the stream.
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device). An
    ///   unknown name falls back to the default device.
    /// - `buffer_ms`: Ring buffer length in milliseconds
    ///
    /// # Errors
    /// `AudioOutput` when no device can be opened at 44.1kHz stereo.
    pub fn open(device_name: Option<String>, buffer_ms: u32) -> Result<Self> {
        let capacity_samples = (TARGET_SAMPLE_RATE as usize * TARGET_CHANNELS * buffer_ms as usize
            / 1000)
            .max(TARGET_CHANNELS * 1024);
        let rb = HeapRb::<i16>::new(capacity_samples);
        let (producer, consumer) = rb.split();

        let shared = Arc::new(OutputShared::default());
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match start_stream(device_name, consumer, thread_shared) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until the output is dropped
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause stream: {}", e);
                }
                drop(stream);
                debug!("Audio output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::AudioOutput(
                    "Output thread exited before the stream started".to_string(),
                ));
            }
        };

        info!(
            "Audio stream started on '{}' ({} ms buffer)",
            device_name, buffer_ms
        );

        Ok(Self {
            device_name,
            shared,
            producer: Arc::new(Mutex::new(producer)),
            capacity_samples,
            voice: Arc::new(Semaphore::new(1)),
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    pub fn capacity_samples(&self) -> usize {
        self.capacity_samples
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Pick the device, build the stream and start it. Runs on the output thread.
fn start_stream(
    device_name: Option<String>,
    consumer: HeapCons<i16>,
    shared: Arc<OutputShared>,
) -> Result<(Stream, String)> {
    let host = cpal::default_host();

    // Try to get requested device, with fallback to default
    let device = match device_name.as_ref() {
        Some(name) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::AudioOutput(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
    };

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let (config, sample_format) = canonical_config(&device)?;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, shared)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, shared)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, shared)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, name))
}

/// Find a 44.1kHz stereo configuration, preferring f32, then i16, then u16.
fn canonical_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() as usize == TARGET_CHANNELS
                && c.min_sample_rate().0 <= TARGET_SAMPLE_RATE
                && c.max_sample_rate().0 >= TARGET_SAMPLE_RATE
        })
        .collect();

    for format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
        if let Some(range) = supported.iter().find(|c| c.sample_format() == format) {
            let config = range
                .clone()
                .with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE))
                .config();
            return Ok((config, format));
        }
    }

    Err(Error::AudioOutput(format!(
        "Device does not support {} Hz stereo output",
        TARGET_SAMPLE_RATE
    )))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    shared: Arc<OutputShared>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let callback_shared = Arc::clone(&shared);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if callback_shared.flush.load(Ordering::Acquire) {
                    consumer.clear();
                    callback_shared.flush.store(false, Ordering::Release);
                }

                let mut played = 0usize;
                for sample in data.iter_mut() {
                    *sample = match consumer.try_pop() {
                        Some(s) => {
                            played += 1;
                            T::from_sample(s)
                        }
                        None => T::EQUILIBRIUM,
                    };
                }

                if played > 0 && played < data.len() {
                    callback_shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                shared.error.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

#[async_trait]
impl AudioSink for AudioOutput {
    async fn open_player(&self) -> Result<Box<dyn PcmPlayer>> {
        let permit = Arc::clone(&self.voice)
            .acquire_owned()
            .await
            .map_err(|_| Error::AudioOutput("Audio output closed".to_string()))?;

        if self.shared.error.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("Audio stream failed".to_string()));
        }

        // Let the previous player's flush land before pushing new samples
        let deadline = tokio::time::Instant::now() + FLUSH_WAIT;
        while self.shared.flush.load(Ordering::Acquire) {
            if tokio::time::Instant::now() >= deadline {
                warn!("Output flush did not complete, continuing");
                break;
            }
            tokio::time::sleep(BACKPRESSURE_SLEEP).await;
        }

        Ok(Box::new(DevicePlayer {
            producer: Arc::clone(&self.producer),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        }))
    }
}

/// Holds the output voice for one clip.
struct DevicePlayer {
    producer: Arc<Mutex<HeapProd<i16>>>,
    shared: Arc<OutputShared>,
    _permit: OwnedSemaphorePermit,
}

impl DevicePlayer {
    fn check_stream(&self) -> Result<()> {
        if self.shared.error.load(Ordering::SeqCst) {
            Err(Error::AudioOutput("Audio stream failed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PcmPlayer for DevicePlayer {
    async fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let samples: Vec<i16> = pcm
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let mut offset = 0usize;
        while offset < samples.len() {
            self.check_stream()?;
            let pushed = self.producer.lock().push_slice(&samples[offset..]);
            offset += pushed;
            if offset < samples.len() {
                tokio::time::sleep(BACKPRESSURE_SLEEP).await;
            }
        }

        Ok(samples.len() * BYTES_PER_SAMPLE)
    }

    async fn drain(&mut self) -> Result<()> {
        let queued = self.producer.lock().occupied_len();
        let expected = Duration::from_secs_f64(
            queued as f64 / (TARGET_SAMPLE_RATE as usize * TARGET_CHANNELS) as f64,
        );
        let deadline = tokio::time::Instant::now() + expected + DRAIN_SLACK;

        loop {
            let remaining = self.producer.lock().occupied_len();
            if remaining == 0 {
                break;
            }
            self.check_stream()?;
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::AudioOutput("Output stalled while draining".to_string()));
            }
            tokio::time::sleep(BACKPRESSURE_SLEEP).await;
        }
        Ok(())
    }
}

impl Drop for DevicePlayer {
    fn drop(&mut self) {
        // Discard anything this clip left unplayed
        if self.producer.lock().occupied_len() > 0 {
            self.shared.flush.store(true, Ordering::Release);
        }
    }
}
