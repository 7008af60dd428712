//! soundboard-server configuration
//!
//! Merges command-line overrides, environment, the optional TOML file and
//! compiled defaults into one resolved [`Config`].

use crate::audio::Loudness;
use soundboard_common::config::{resolve_folder, FileConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_UPLOADS_FOLDER: &str = "uploads";
pub const DEFAULT_STATIC_FOLDER: &str = "static";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_OUTPUT_BUFFER_MS: u32 = 100;
pub const DEFAULT_PLAYBACK_GAIN_DB: f32 = 0.0;

pub const UPLOADS_ENV: &str = "SOUNDBOARD_UPLOADS";
pub const STATIC_ENV: &str = "SOUNDBOARD_STATIC";

/// Values given on the command line (clap already applied env fallbacks
/// for port and device).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub uploads_folder: Option<PathBuf>,
    pub static_folder: Option<PathBuf>,
    pub audio_device: Option<String>,
    pub null_output: bool,
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub uploads_folder: PathBuf,
    pub static_folder: PathBuf,
    /// Output device name (None = system default)
    pub audio_device: Option<String>,
    /// Use the device-less sink instead of cpal
    pub null_output: bool,
    pub max_upload_bytes: usize,
    pub outbox_capacity: usize,
    pub write_timeout: Duration,
    pub output_buffer_ms: u32,
    pub announce_stop_toggles: bool,
    /// Level applied to every decoded sound
    pub loudness: Loudness,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            uploads_folder: PathBuf::from(DEFAULT_UPLOADS_FOLDER),
            static_folder: PathBuf::from(DEFAULT_STATIC_FOLDER),
            audio_device: None,
            null_output: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            output_buffer_ms: DEFAULT_OUTPUT_BUFFER_MS,
            announce_stop_toggles: true,
            loudness: Loudness::new(None, DEFAULT_PLAYBACK_GAIN_DB),
        }
    }
}

impl Config {
    /// Priority: CLI > environment > TOML file > default
    pub fn resolve(cli: CliOverrides, file: FileConfig) -> Self {
        let defaults = Self::default();

        Self {
            port: cli.port.or(file.port).unwrap_or(defaults.port),
            uploads_folder: resolve_folder(
                cli.uploads_folder.as_deref(),
                UPLOADS_ENV,
                file.uploads_folder.as_deref(),
                DEFAULT_UPLOADS_FOLDER,
            ),
            static_folder: resolve_folder(
                cli.static_folder.as_deref(),
                STATIC_ENV,
                file.static_folder.as_deref(),
                DEFAULT_STATIC_FOLDER,
            ),
            audio_device: cli.audio_device.or(file.audio_device),
            null_output: cli.null_output,
            max_upload_bytes: file.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            outbox_capacity: file
                .outbox_capacity
                .unwrap_or(defaults.outbox_capacity)
                .max(1),
            write_timeout: file
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
            output_buffer_ms: file.output_buffer_ms.unwrap_or(defaults.output_buffer_ms),
            announce_stop_toggles: file
                .announce_stop_toggles
                .unwrap_or(defaults.announce_stop_toggles),
            loudness: Loudness::new(
                file.normalize_dbfs.or(defaults.loudness.normalize_dbfs),
                file.playback_gain_db.unwrap_or(defaults.loudness.gain_db),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            port: Some(6000),
            audio_device: Some("Speakers".to_string()),
            ..Default::default()
        };
        let cli = CliOverrides {
            port: Some(7000),
            ..Default::default()
        };

        let config = Config::resolve(cli, file);
        assert_eq!(config.port, 7000);
        assert_eq!(config.audio_device.as_deref(), Some("Speakers"));
    }

    #[test]
    fn test_file_values_and_defaults() {
        let file = FileConfig {
            outbox_capacity: Some(0),
            write_timeout_ms: Some(250),
            announce_stop_toggles: Some(false),
            ..Default::default()
        };

        let config = Config::resolve(CliOverrides::default(), file);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.outbox_capacity, 1);
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert!(!config.announce_stop_toggles);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert!(config.loudness.is_unity());
    }

    #[test]
    fn test_loudness_from_file() {
        let file = FileConfig {
            normalize_dbfs: Some(-30.0),
            playback_gain_db: Some(-9.0),
            ..Default::default()
        };

        let config = Config::resolve(CliOverrides::default(), file);
        assert_eq!(config.loudness, Loudness::new(Some(-30.0), -9.0));
    }
}
