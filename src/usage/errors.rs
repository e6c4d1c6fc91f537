//! # Usage Errors

use thiserror::Error;

use crate::store::StoreError;

/// Result type for usage estimation
pub type UsageResult<T> = Result<T, UsageError>;

/// Usage estimation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The quota provider failed; callers fall back to the byte sum
    #[error("Quota query failed: {0}")]
    QuotaQueryFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UsageError {
    pub fn code(&self) -> &'static str {
        match self {
            UsageError::QuotaQueryFailed(_) => "MDB_USAGE_QUOTA_QUERY_FAILED",
            UsageError::Store(err) => err.code(),
        }
    }
}
