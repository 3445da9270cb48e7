//! File-backed key-value store for the credential.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use checkpoint_core::auth::{KeyValueStore, StorageError};
use directories::ProjectDirs;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const STORE_FILE: &str = "credentials.json";

/// JSON object on disk, one entry per key. Writes go through a temporary
/// file and a rename so a crash never leaves half a document behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store under the platform data directory.
    pub fn in_data_dir() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("net", "inncome", "checkpoint").ok_or_else(|| {
            StorageError::Unavailable("unable to determine data directory".to_string())
        })?;
        Ok(Self::new(dirs.data_dir().join(STORE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(StorageError::ReadFailed(err)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|err| StorageError::CorruptedData(err.to_string()))
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(StorageError::WriteFailed)?;
        }

        let content = serde_json::to_string_pretty(map)
            .map_err(|err| StorageError::CorruptedData(err.to_string()))?;
        let staging = self.path.with_extension("json.tmp");
        let mut file = open_private(&staging).await?;
        file.write_all(content.as_bytes())
            .await
            .map_err(StorageError::WriteFailed)?;
        file.sync_all().await.map_err(StorageError::WriteFailed)?;
        drop(file);
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(StorageError::WriteFailed)?;
        debug!(path = %self.path.display(), entries = map.len(), "store written");
        Ok(())
    }
}

/// Opens the staging file owner-only before any content is written.
#[cfg(unix)]
async fn open_private(path: &Path) -> Result<File, StorageError> {
    use std::os::unix::fs::PermissionsExt;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(StorageError::WriteFailed)?;
    // The mode only applies on creation; a leftover staging file keeps its own.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(StorageError::WriteFailed)?;
    Ok(file)
}

#[cfg(not(unix))]
async fn open_private(path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(StorageError::WriteFailed)
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        // A corrupted document is replaced rather than blocking new logins.
        let mut map = match self.read_map().await {
            Ok(map) => map,
            Err(StorageError::CorruptedData(_)) => BTreeMap::new(),
            Err(err) => return Err(err),
        };
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        match self.read_map().await {
            Ok(mut map) => {
                if map.remove(key).is_none() {
                    return Ok(());
                }
                self.write_map(&map).await
            }
            Err(StorageError::CorruptedData(_)) => self.write_map(&BTreeMap::new()).await,
            Err(err) => Err(err),
        }
    }
}
