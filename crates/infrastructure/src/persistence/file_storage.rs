//! File-backed key-value storage.
//!
//! All keys live in one JSON object, by default in the platform config
//! directory:
//! - Linux: ~/.config/shopkeep/credentials.json
//! - macOS: ~/Library/Application Support/shopkeep/credentials.json
//! - Windows: %APPDATA%/shopkeep/credentials.json

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shopkeep_application::ports::{KeyValueStorage, StorageError};
use tokio::fs;
use tokio::sync::Mutex;

use crate::serialization::{from_json_bytes, to_json_stable_bytes};

type Entries = BTreeMap<String, String>;

/// Key-value storage persisted as a JSON file.
///
/// Writes go to a sibling temporary file first and are then renamed over
/// the existing one, so a crash never leaves a half-written file behind. On
/// Unix the file is only readable by its owner.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates storage backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates storage at `shopkeep/credentials.json` in the config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no config directory.
    pub fn in_config_dir() -> Result<Self, StorageError> {
        Self::default_path().map(Self::new).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "could not determine config directory",
            ))
        })
    }

    /// Returns the default file location, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shopkeep").join("credentials.json"))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Entries, StorageError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };

        from_json_bytes(&content).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn write_entries(&self, entries: &Entries) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content =
            to_json_stable_bytes(entries).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, content).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, Permissions::from_mode(0o600)).await?;
        }

        fs::rename(&staging, &self.path).await?;
        tracing::trace!(path = %self.path.display(), keys = entries.len(), "storage written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}
