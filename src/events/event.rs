//! Storage lifecycle events
//!
//! Events are transient: never persisted, never queued.

use std::fmt;

use serde::Serialize;

use crate::capacity::CleanupReport;
use crate::config::ManagerConfig;
use crate::store::RestoreReport;
use crate::usage::UsageInfo;

/// Event tag without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Stopped,
    StorageChecked,
    CleanupStarted,
    CleanupCompleted,
    BackupStarted,
    BackupCompleted,
    OldBackupsCleanedUp,
    RestoreStarted,
    RestoreCompleted,
    ConfigUpdated,
    Error,
}

impl EventKind {
    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Stopped => "stopped",
            EventKind::StorageChecked => "storageChecked",
            EventKind::CleanupStarted => "cleanupStarted",
            EventKind::CleanupCompleted => "cleanupCompleted",
            EventKind::BackupStarted => "backupStarted",
            EventKind::BackupCompleted => "backupCompleted",
            EventKind::OldBackupsCleanedUp => "oldBackupsCleanedUp",
            EventKind::RestoreStarted => "restoreStarted",
            EventKind::RestoreCompleted => "restoreCompleted",
            EventKind::ConfigUpdated => "configUpdated",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event with its payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum StorageEvent {
    Started,
    Stopped,
    StorageChecked(UsageInfo),
    CleanupStarted(UsageInfo),
    CleanupCompleted(CleanupReport),
    BackupStarted,
    BackupCompleted { key: String, count: usize },
    OldBackupsCleanedUp { removed: Vec<String> },
    RestoreStarted { key: String },
    RestoreCompleted { key: String, report: RestoreReport },
    ConfigUpdated(ManagerConfig),
    /// A scheduled cycle or lifecycle step failed
    Error { origin: String, message: String },
}

impl StorageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StorageEvent::Started => EventKind::Started,
            StorageEvent::Stopped => EventKind::Stopped,
            StorageEvent::StorageChecked(_) => EventKind::StorageChecked,
            StorageEvent::CleanupStarted(_) => EventKind::CleanupStarted,
            StorageEvent::CleanupCompleted(_) => EventKind::CleanupCompleted,
            StorageEvent::BackupStarted => EventKind::BackupStarted,
            StorageEvent::BackupCompleted { .. } => EventKind::BackupCompleted,
            StorageEvent::OldBackupsCleanedUp { .. } => EventKind::OldBackupsCleanedUp,
            StorageEvent::RestoreStarted { .. } => EventKind::RestoreStarted,
            StorageEvent::RestoreCompleted { .. } => EventKind::RestoreCompleted,
            StorageEvent::ConfigUpdated(_) => EventKind::ConfigUpdated,
            StorageEvent::Error { .. } => EventKind::Error,
        }
    }

    pub fn error(origin: impl Into<String>, message: impl Into<String>) -> Self {
        StorageEvent::Error {
            origin: origin.into(),
            message: message.into(),
        }
    }
}
