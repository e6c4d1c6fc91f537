//! # Backup Errors
//!
//! Backup and restore fail as a whole only on unrecoverable input
//! (`NotFound`, `Parse`) or on an I/O failure of the backup area. Per-record
//! problems during restore are reported in the `RestoreReport` instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Backup subsystem errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackupError {
    /// The key does not resolve to stored data
    #[error("Backup not found: {0}")]
    NotFound(String),

    /// The blob is not a well-formed snapshot
    #[error("Malformed backup: {0}")]
    Parse(String),

    #[error("Invalid backup key: {0}")]
    InvalidKey(String),

    #[error("Backup I/O error: {0}")]
    Io(String),

    #[error("Invalid backup configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for BackupError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Parse(message) => BackupError::Parse(message),
            other => BackupError::Store(other),
        }
    }
}

impl BackupError {
    pub fn code(&self) -> &'static str {
        match self {
            BackupError::NotFound(_) => "MDB_BACKUP_NOT_FOUND",
            BackupError::Parse(_) => "MDB_BACKUP_PARSE",
            BackupError::InvalidKey(_) => "MDB_BACKUP_INVALID_KEY",
            BackupError::Io(_) => "MDB_BACKUP_IO",
            BackupError::Config(err) => err.code(),
            BackupError::Store(err) => err.code(),
            BackupError::Internal(_) => "MDB_BACKUP_INTERNAL",
        }
    }

    pub(crate) fn poisoned() -> Self {
        BackupError::Internal("Lock poisoned".into())
    }
}
