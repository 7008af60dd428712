//! Configuration file loading and folder resolution
//!
//! Values are resolved in this order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application directory name under the platform config dir
const APP_DIR: &str = "soundboard";

/// Config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional settings read from the TOML config file.
///
/// Every key is optional; missing keys fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// HTTP listen port
    pub port: Option<u16>,
    /// Folder holding uploaded sounds
    pub uploads_folder: Option<PathBuf>,
    /// Folder with static web assets
    pub static_folder: Option<PathBuf>,
    /// Output device name (None = system default)
    pub audio_device: Option<String>,
    /// Maximum accepted upload body in bytes
    pub max_upload_bytes: Option<usize>,
    /// Per-connection outbound queue depth
    pub outbox_capacity: Option<usize>,
    /// Per-message write timeout for client connections
    pub write_timeout_ms: Option<u64>,
    /// Output ring buffer length in milliseconds
    pub output_buffer_ms: Option<u32>,
    /// Broadcast `sound-played` also for toggles that stop a clip
    pub announce_stop_toggles: Option<bool>,
    /// Normalize every decoded sound to this RMS level (dBFS)
    pub normalize_dbfs: Option<f32>,
    /// Fixed gain in dB applied to every decoded sound
    pub playback_gain_db: Option<f32>,
}

impl FileConfig {
    /// Parse config file contents
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load the config file.
    ///
    /// An explicitly requested file must exist. Without one, the platform
    /// default location is tried and a missing file yields all defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text).map_err(|e| {
            Error::Config(format!("{}: {}", path.display(), e))
        })?;
        info!("Loaded config file: {}", path.display());
        Ok(config)
    }
}

/// Platform default config file location
/// (`~/.config/soundboard/config.toml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Resolve a folder setting following the priority order above.
pub fn resolve_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_value: Option<&Path>,
    default: &str,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = file_value {
        return path.to_path_buf();
    }

    // Priority 4: Compiled default
    PathBuf::from(default)
}
