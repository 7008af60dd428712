//! Sound library: the storage boundary of the playback core
//!
//! The playback core only sees [`AssetSource`]: it resolves client filenames
//! to asset keys, checks existence, and opens byte streams. [`SoundLibrary`]
//! implements it over the uploads folder and also handles listing and
//! storing uploads for the HTTP layer.

use crate::audio::types::AssetKey;
use crate::error::{Error, Result};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use symphonia::core::io::MediaSource;
use tracing::{debug, info};

/// Extensions accepted for upload and playback
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

/// An opened encoded byte stream plus a format hint.
pub struct SourceStream {
    pub reader: Box<dyn MediaSource>,
    pub extension: Option<String>,
}

impl SourceStream {
    pub fn new(reader: Box<dyn MediaSource>, extension: Option<String>) -> Self {
        Self { reader, extension }
    }

    /// In-memory stream, used for uploads held in memory and in tests
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Self {
        Self {
            reader: Box::new(Cursor::new(bytes)),
            extension: extension.map(str::to_string),
        }
    }
}

/// Resolves filenames to asset keys and opens their byte streams.
pub trait AssetSource: Send + Sync {
    /// Map a client-supplied filename to an asset key.
    /// Returns `None` for names that can never refer to an asset.
    fn resolve(&self, filename: &str) -> Option<AssetKey>;

    /// Whether the underlying resource currently exists
    fn exists(&self, key: &AssetKey) -> bool;

    /// Open the encoded byte stream for `key`
    fn open(&self, key: &AssetKey) -> Result<SourceStream>;
}

/// Whether `filename` has one of the allowed extensions
pub fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether `filename` is a single normal path component
fn is_plain_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Uploaded sounds stored flat in one folder.
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    root: PathBuf,
}

impl SoundLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &AssetKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Playable files in the folder, sorted by name
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if has_allowed_extension(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Store an uploaded file.
    ///
    /// # Errors
    /// - `BadRequest` for an invalid name or disallowed extension
    /// - `Conflict` when a file with that name already exists (decoded
    ///   assets are cached for the process lifetime, so a replaced file
    ///   would never be heard)
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<AssetKey> {
        if !is_plain_filename(filename) {
            return Err(Error::BadRequest(format!("Invalid filename: {}", filename)));
        }
        if !has_allowed_extension(filename) {
            return Err(Error::BadRequest(format!(
                "Unsupported file type (allowed: {})",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let key = AssetKey::new(filename);
        let path = self.path_for(&key);

        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!("File already exists: {}", filename)));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        std::io::Write::write_all(&mut file, bytes)?;
        info!("Stored upload {} ({} bytes)", filename, bytes.len());
        Ok(key)
    }
}

impl AssetSource for SoundLibrary {
    fn resolve(&self, filename: &str) -> Option<AssetKey> {
        if is_plain_filename(filename) {
            Some(AssetKey::new(filename))
        } else {
            debug!("Rejected filename {:?}", filename);
            None
        }
    }

    fn exists(&self, key: &AssetKey) -> bool {
        self.path_for(key).is_file()
    }

    fn open(&self, key: &AssetKey) -> Result<SourceStream> {
        let file = std::fs::File::open(self.path_for(key))?;
        Ok(SourceStream::new(Box::new(file), key.extension()))
    }
}
