//! # Capacity Errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::usage::UsageError;

/// Result type for the capacity monitor
pub type CapacityResult<T> = Result<T, CapacityError>;

/// Errors from a cleanup pass or a monitor reconfiguration
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapacityError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid capacity configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CapacityError {
    pub fn code(&self) -> &'static str {
        match self {
            CapacityError::Usage(err) => err.code(),
            CapacityError::Store(err) => err.code(),
            CapacityError::Config(err) => err.code(),
            CapacityError::Internal(_) => "MDB_CAPACITY_INTERNAL",
        }
    }

    pub(crate) fn poisoned() -> Self {
        CapacityError::Internal("Lock poisoned".into())
    }
}
