//! Record store errors

use thiserror::Error;

/// Result type for record store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record id: {0}")]
    InvalidId(String),

    #[error("Invalid record: {0}")]
    Validation(String),

    #[error("Backend I/O error: {0}")]
    Io(String),

    #[error("Record {id} is corrupted: {reason}")]
    Corrupted { id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed snapshot: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "MDB_STORE_NOT_FOUND",
            StoreError::InvalidId(_) => "MDB_STORE_INVALID_ID",
            StoreError::Validation(_) => "MDB_STORE_VALIDATION",
            StoreError::Io(_) => "MDB_STORE_IO",
            StoreError::Corrupted { .. } => "MDB_STORE_CORRUPTED",
            StoreError::Serialization(_) => "MDB_STORE_SERIALIZATION",
            StoreError::Parse(_) => "MDB_STORE_PARSE",
            StoreError::Internal(_) => "MDB_STORE_INTERNAL",
        }
    }

    pub(crate) fn poisoned() -> Self {
        StoreError::Internal("Lock poisoned".into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
