//! CLI-specific error types
//!
//! Subsystem errors keep their own code in the JSON error response.

use std::io;

use thiserror::Error;

use crate::backup::BackupError;
use crate::capacity::CapacityError;
use crate::config::ConfigError;
use crate::manager::ManagerError;
use crate::query::QueryError;
use crate::store::StoreError;
use crate::usage::UsageError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file missing or invalid
    #[error("{0}")]
    Config(String),

    /// stdin/stdout failure
    #[error("{0}")]
    Io(String),

    /// Request body is not what the command expects
    #[error("{0}")]
    InvalidInput(String),

    #[error("Data directory already initialized")]
    AlreadyInitialized,

    #[error("Data directory not initialized. Run 'manifestdb init' first.")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Manager(#[from] ManagerError),
}

impl CliError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        CliError::Config(msg.into())
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        CliError::Io(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    /// Error code string
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Config(_) => "MDB_CLI_CONFIG_ERROR",
            CliError::Io(_) => "MDB_CLI_IO_ERROR",
            CliError::InvalidInput(_) => "MDB_CLI_INVALID_INPUT",
            CliError::AlreadyInitialized => "MDB_CLI_ALREADY_INITIALIZED",
            CliError::NotInitialized => "MDB_CLI_NOT_INITIALIZED",
            CliError::Store(err) => err.code(),
            CliError::Usage(err) => err.code(),
            CliError::Capacity(err) => err.code(),
            CliError::Backup(err) => err.code(),
            CliError::Query(err) => err.code(),
            CliError::Manager(err) => err.code(),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid_input(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(CliError::NotInitialized.code(), "MDB_CLI_NOT_INITIALIZED");
        assert_eq!(
            CliError::from(StoreError::NotFound("x".into())).code(),
            "MDB_STORE_NOT_FOUND"
        );
        assert_eq!(
            CliError::from(ConfigError::ZeroInterval("backup_interval_ms")).code(),
            "MDB_CLI_CONFIG_ERROR"
        );
    }
}
