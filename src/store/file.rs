//! # File Backend
//!
//! One file per record under `<root>/records/`:
//!
//! ```text
//! <id>.json = { "checksum": <crc32 of body>, "body": "<record JSON>" }
//! ```
//!
//! Writes go to `<id>.json.tmp`, are fsynced, then renamed over the target,
//! so a reader sees either the old record or the new one. Every read
//! verifies the checksum; a mismatch is reported as `Corrupted`.
//!
//! An id that could never have been written (outside the file-name
//! charset) reads as absent. A full listing skips unreadable or corrupt
//! files with a WARN so one bad record never hides the rest.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use super::backend::RecordBackend;
use super::errors::{StoreError, StoreResult};
use super::record::{validate_id, StoredRecord};
use crate::observability::Logger;

const RECORD_DIR: &str = "records";
const RECORD_EXT: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    checksum: u32,
    body: String,
}

fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Durable backend rooted at a data directory
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) the record directory under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = data_dir.as_ref().join(RECORD_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::Io(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// Directory holding record files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self.dir.join(format!("{}.{}", id, RECORD_EXT)))
    }

    /// `None` for ids no record file can carry
    fn lookup_path(&self, id: &str) -> Option<PathBuf> {
        self.path_for(id).ok()
    }

    fn read_file(&self, id: &str, path: &Path) -> StoreResult<Option<StoredRecord>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let corrupted = |reason: String| StoreError::Corrupted {
            id: id.to_string(),
            reason,
        };

        let envelope: RecordEnvelope =
            serde_json::from_str(&content).map_err(|e| corrupted(e.to_string()))?;
        if compute_checksum(envelope.body.as_bytes()) != envelope.checksum {
            return Err(corrupted("checksum mismatch".into()));
        }
        let record: StoredRecord =
            serde_json::from_str(&envelope.body).map_err(|e| corrupted(e.to_string()))?;
        Ok(Some(record))
    }
}

impl RecordBackend for FileBackend {
    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        match self.lookup_path(id) {
            Some(path) => self.read_file(id, &path),
            None => Ok(None),
        }
    }

    fn put(&self, record: &StoredRecord) -> StoreResult<()> {
        let path = self.path_for(&record.id)?;
        let body = serde_json::to_string(record)?;
        let envelope = RecordEnvelope {
            checksum: compute_checksum(body.as_bytes()),
            body,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXT));
        let io_err =
            |e: std::io::Error| StoreError::Io(format!("Failed to write {}: {}", tmp.display(), e));

        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Io(format!("Failed to replace {}: {}", path.display(), e))
        })
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let path = match self.lookup_path(id) {
            Some(path) => path,
            None => return Ok(false),
        };
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn list(&self) -> StoreResult<Vec<StoredRecord>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            StoreError::Io(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self.dir.join(format!("{}.{}", id, RECORD_EXT));
            match self.read_file(&id, &path) {
                Ok(Some(record)) => records.push(record),
                // Deleted between listing and reading
                Ok(None) => {}
                Err(err) => Logger::warn(
                    "RECORD_CORRUPTED",
                    &[
                        ("id", id.as_str()),
                        ("code", err.code()),
                        ("reason", err.to_string().as_str()),
                    ],
                ),
            }
        }
        Ok(records)
    }

    fn clear(&self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            StoreError::Io(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| {
                    StoreError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(())
    }
}
