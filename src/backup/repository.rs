//! # Backup Repository
//!
//! String-keyed, string-valued area holding backup blobs.
//!
//! - `MemoryBackupRepository`: volatile, for tests and embedding
//! - `FileBackupRepository`: one `<key>.json` per backup under
//!   `<root>/backups/`, written via temp file + fsync + rename

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::errors::{BackupError, BackupResult};
use crate::store::validate_id;

/// Storage for backup blobs
pub trait BackupRepository: Send + Sync + std::fmt::Debug {
    /// Every key in the area, sorted
    fn list(&self) -> BackupResult<Vec<String>>;

    fn get(&self, key: &str) -> BackupResult<Option<String>>;

    /// Write `blob` under `key`, replacing any previous value
    fn put(&self, key: &str, blob: &str) -> BackupResult<()>;

    /// `false` if `key` was absent
    fn remove(&self, key: &str) -> BackupResult<bool>;

    /// Stored size in bytes, `None` if `key` is absent
    fn size(&self, key: &str) -> BackupResult<Option<u64>>;
}

/// Volatile backup area
#[derive(Debug, Default)]
pub struct MemoryBackupRepository {
    blobs: RwLock<BTreeMap<String, String>>,
}

impl MemoryBackupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupRepository for MemoryBackupRepository {
    fn list(&self) -> BackupResult<Vec<String>> {
        let blobs = self.blobs.read().map_err(|_| BackupError::poisoned())?;
        Ok(blobs.keys().cloned().collect())
    }

    fn get(&self, key: &str) -> BackupResult<Option<String>> {
        let blobs = self.blobs.read().map_err(|_| BackupError::poisoned())?;
        Ok(blobs.get(key).cloned())
    }

    fn put(&self, key: &str, blob: &str) -> BackupResult<()> {
        let mut blobs = self.blobs.write().map_err(|_| BackupError::poisoned())?;
        blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> BackupResult<bool> {
        let mut blobs = self.blobs.write().map_err(|_| BackupError::poisoned())?;
        Ok(blobs.remove(key).is_some())
    }

    fn size(&self, key: &str) -> BackupResult<Option<u64>> {
        let blobs = self.blobs.read().map_err(|_| BackupError::poisoned())?;
        Ok(blobs.get(key).map(|blob| blob.len() as u64))
    }
}

const BACKUP_DIR: &str = "backups";
const BACKUP_EXT: &str = "json";

/// Backup area on disk
#[derive(Debug)]
pub struct FileBackupRepository {
    dir: PathBuf,
}

impl FileBackupRepository {
    /// Open (creating if needed) the backup directory under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> BackupResult<Self> {
        let dir = data_dir.as_ref().join(BACKUP_DIR);
        fs::create_dir_all(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> BackupResult<PathBuf> {
        validate_id(key).map_err(|e| BackupError::InvalidKey(e.to_string()))?;
        Ok(self.dir.join(format!("{}.{}", key, BACKUP_EXT)))
    }

    /// Keys that could never have been written hold no data
    fn lookup_path(&self, key: &str) -> Option<PathBuf> {
        self.path_for(key).ok()
    }
}

impl BackupRepository for FileBackupRepository {
    fn list(&self) -> BackupResult<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| BackupError::Io(format!("Failed to list {}: {}", self.dir.display(), e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| BackupError::Io(e.to_string()))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> BackupResult<Option<String>> {
        let path = match self.lookup_path(key) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn put(&self, key: &str, blob: &str) -> BackupResult<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension(format!("{}.tmp", BACKUP_EXT));
        let io_err =
            |e: std::io::Error| BackupError::Io(format!("Failed to write {}: {}", tmp.display(), e));

        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(blob.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            BackupError::Io(format!("Failed to replace {}: {}", path.display(), e))
        })
    }

    fn remove(&self, key: &str) -> BackupResult<bool> {
        let path = match self.lookup_path(key) {
            Some(path) => path,
            None => return Ok(false),
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn size(&self, key: &str) -> BackupResult<Option<u64>> {
        let path = match self.lookup_path(key) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackupError::Io(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
