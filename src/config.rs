//! Manager Configuration
//!
//! Capacity and backup settings, loaded from JSON with per-field defaults
//! and checked by `validate()` before use.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Invalid configuration values
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within 0..=100, got {value}")]
    PercentOutOfRange { field: &'static str, value: f64 },

    #[error("target_usage ({target}) must not exceed cleanup_threshold ({threshold})")]
    TargetAboveThreshold { target: f64, threshold: f64 },

    #[error("cleanup_threshold must be below 100 since usage never exceeds 100, got {0}")]
    ThresholdUnreachable(f64),

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::PercentOutOfRange { .. } => "MDB_CONFIG_PERCENT_OUT_OF_RANGE",
            ConfigError::TargetAboveThreshold { .. } => "MDB_CONFIG_TARGET_ABOVE_THRESHOLD",
            ConfigError::ThresholdUnreachable(_) => "MDB_CONFIG_THRESHOLD_UNREACHABLE",
            ConfigError::ZeroInterval(_) => "MDB_CONFIG_ZERO_INTERVAL",
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Eviction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Usage percentage above which cleanup starts (default: 80)
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: f64,

    /// Usage percentage cleanup stops at (default: 70)
    #[serde(default = "default_target_usage")]
    pub target_usage: f64,

    /// Records eviction never goes below (default: 10)
    #[serde(default = "default_min_retain_count")]
    pub min_retain_count: usize,

    /// Period of the monitor loop (default: 5 minutes)
    #[serde(default = "default_monitoring_interval_ms")]
    pub monitoring_interval_ms: u64,
}

fn default_cleanup_threshold() -> f64 {
    80.0
}

fn default_target_usage() -> f64 {
    70.0
}

fn default_min_retain_count() -> usize {
    10
}

fn default_monitoring_interval_ms() -> u64 {
    5 * MINUTE_MS
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            cleanup_threshold: default_cleanup_threshold(),
            target_usage: default_target_usage(),
            min_retain_count: default_min_retain_count(),
            monitoring_interval_ms: default_monitoring_interval_ms(),
        }
    }
}

impl CapacityConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_percent("cleanup_threshold", self.cleanup_threshold)?;
        check_percent("target_usage", self.target_usage)?;
        // Usage is clamped to 100, so cleanup triggers only strictly above the threshold
        if self.cleanup_threshold >= 100.0 {
            return Err(ConfigError::ThresholdUnreachable(self.cleanup_threshold));
        }
        if self.target_usage > self.cleanup_threshold {
            return Err(ConfigError::TargetAboveThreshold {
                target: self.target_usage,
                threshold: self.cleanup_threshold,
            });
        }
        if self.monitoring_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("monitoring_interval_ms"));
        }
        Ok(())
    }
}

fn check_percent(field: &'static str, value: f64) -> ConfigResult<()> {
    // NaN fails the range check as well.
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::PercentOutOfRange { field, value })
    }
}

/// Automatic backup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Run the backup timer while the manager is started (default: true)
    #[serde(default = "default_auto_backup_enabled")]
    pub auto_backup_enabled: bool,

    /// Period of the backup timer (default: 24 hours)
    #[serde(default = "default_backup_interval_ms")]
    pub backup_interval_ms: u64,

    /// Backups older than this are pruned (default: 7 days)
    #[serde(default = "default_max_backup_age_ms")]
    pub max_backup_age_ms: u64,
}

fn default_auto_backup_enabled() -> bool {
    true
}

fn default_backup_interval_ms() -> u64 {
    DAY_MS
}

fn default_max_backup_age_ms() -> u64 {
    7 * DAY_MS
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            auto_backup_enabled: default_auto_backup_enabled(),
            backup_interval_ms: default_backup_interval_ms(),
            max_backup_age_ms: default_max_backup_age_ms(),
        }
    }
}

impl BackupConfig {
    pub fn backup_interval(&self) -> Duration {
        Duration::from_millis(self.backup_interval_ms)
    }

    pub fn max_backup_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.max_backup_age_ms).unwrap_or(i64::MAX))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.backup_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("backup_interval_ms"));
        }
        Ok(())
    }
}

/// Everything the storage manager can be reconfigured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub capacity: CapacityConfig,

    #[serde(default)]
    pub backup: BackupConfig,
}

impl ManagerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.capacity.validate()?;
        self.backup.validate()
    }
}
