//! # Quota Providers

use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{UsageError, UsageResult};

/// What a quota provider reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaEstimate {
    /// Bytes in use, when the provider measures them itself
    pub used_bytes: Option<u64>,
    /// Bytes available in total
    pub quota_bytes: u64,
}

/// Authoritative source of storage usage and quota
pub trait QuotaProvider: Send + Sync + std::fmt::Debug {
    fn estimate(&self) -> UsageResult<QuotaEstimate>;
}

/// A configured quota; usage comes from the local byte sum
#[derive(Debug, Clone, Copy)]
pub struct FixedQuota {
    quota_bytes: u64,
}

impl FixedQuota {
    pub fn new(quota_bytes: u64) -> Self {
        Self { quota_bytes }
    }
}

impl QuotaProvider for FixedQuota {
    fn estimate(&self) -> UsageResult<QuotaEstimate> {
        Ok(QuotaEstimate {
            used_bytes: None,
            quota_bytes: self.quota_bytes,
        })
    }
}

/// Measures bytes on disk under a directory against a configured quota
#[derive(Debug, Clone)]
pub struct DirectoryQuota {
    root: PathBuf,
    quota_bytes: u64,
}

impl DirectoryQuota {
    pub fn new(root: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            root: root.into(),
            quota_bytes,
        }
    }
}

impl QuotaProvider for DirectoryQuota {
    fn estimate(&self) -> UsageResult<QuotaEstimate> {
        let used = dir_size(&self.root)?;
        Ok(QuotaEstimate {
            used_bytes: Some(used),
            quota_bytes: self.quota_bytes,
        })
    }
}

fn dir_size(dir: &Path) -> UsageResult<u64> {
    let entries = fs::read_dir(dir).map_err(|e| {
        UsageError::QuotaQueryFailed(format!("Failed to read {}: {}", dir.display(), e))
    })?;

    let mut total = 0;
    for entry in entries {
        let entry = entry.map_err(|e| UsageError::QuotaQueryFailed(e.to_string()))?;
        let metadata = entry
            .metadata()
            .map_err(|e| UsageError::QuotaQueryFailed(e.to_string()))?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}
