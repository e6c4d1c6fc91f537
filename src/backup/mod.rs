//! Backup subsystem for manifestdb
//!
//! Timed, versioned snapshots of the whole record corpus, kept in a
//! `BackupRepository` under the `autobackup_` key prefix.
//!
//! # Lifecycle
//!
//! 1. `perform_auto_backup` snapshots `get_all()` under `autobackup_<epoch-ms>`
//! 2. Backups older than `max_backup_age` are pruned right after
//! 3. `restore_from_backup` merges a snapshot back into the store
//!
//! # Restore Semantics
//!
//! - Unknown key: `NotFound`; malformed envelope: `Parse`
//! - `clear_existing` empties the store first
//! - Each record is imported on its own; an invalid record is listed in
//!   `errors` and the rest of the snapshot is still restored
//!
//! Backups are immutable once written.

mod errors;
mod repository;

pub use errors::{BackupError, BackupResult};
pub use repository::{BackupRepository, FileBackupRepository, MemoryBackupRepository};

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock;
use crate::config::BackupConfig;
use crate::events::{EventBus, StorageEvent};
use crate::observability::{Logger, ObservationScope, StorageMetrics};
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::store::{ParsedSnapshot, RecordStore, RestoreOptions, RestoreReport};

/// Key prefix of automatic backups
pub const BACKUP_PREFIX: &str = "autobackup_";

/// One listed backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    /// Blob size in bytes
    pub size: u64,
}

/// Key for a backup taken at `at`
pub fn backup_key(at: DateTime<Utc>) -> String {
    format!("{}{}", BACKUP_PREFIX, at.timestamp_millis())
}

/// Timestamp encoded in a backup key, `None` for foreign keys
pub fn parse_backup_key(key: &str) -> Option<DateTime<Utc>> {
    let millis = key.strip_prefix(BACKUP_PREFIX)?;
    if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    clock::from_millis(millis.parse().ok()?)
}

#[derive(Debug)]
struct BackupCore {
    store: Arc<RecordStore>,
    repository: Arc<dyn BackupRepository>,
    config: RwLock<BackupConfig>,
    events: Arc<EventBus>,
    metrics: Arc<StorageMetrics>,
}

impl BackupCore {
    fn config(&self) -> BackupResult<BackupConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| BackupError::poisoned())
    }

    fn perform_auto_backup(&self) -> BackupResult<String> {
        self.events.notify(StorageEvent::BackupStarted);
        let scope = ObservationScope::new("BACKUP");

        let (key, count) = match self.write_snapshot() {
            Ok(written) => written,
            Err(err) => {
                scope.fail(&err.to_string());
                return Err(err);
            }
        };
        scope.complete_with_fields(&[
            ("key", key.as_str()),
            ("count", count.to_string().as_str()),
        ]);

        self.metrics.increment_backups();
        self.events.notify(StorageEvent::BackupCompleted {
            key: key.clone(),
            count,
        });

        self.cleanup_old_backups()?;
        Ok(key)
    }

    fn write_snapshot(&self) -> BackupResult<(String, usize)> {
        let snapshot = self.store.export_snapshot()?;
        let key = backup_key(snapshot.export_date);
        self.repository.put(&key, &snapshot.to_json()?)?;
        Ok((key, snapshot.count))
    }

    fn get_available_backups(&self) -> BackupResult<Vec<BackupInfo>> {
        let mut backups = Vec::new();
        for key in self.repository.list()? {
            let timestamp = match parse_backup_key(&key) {
                Some(timestamp) => timestamp,
                None => continue,
            };
            // Removed since listing
            let size = match self.repository.size(&key)? {
                Some(size) => size,
                None => continue,
            };
            backups.push(BackupInfo {
                key,
                timestamp,
                size,
            });
        }
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.key.cmp(&a.key)));
        Ok(backups)
    }

    fn cleanup_old_backups(&self) -> BackupResult<Vec<String>> {
        let cutoff = self.store.clock().now() - self.config()?.max_backup_age();

        let mut removed = Vec::new();
        for backup in self.get_available_backups()? {
            if backup.timestamp < cutoff && self.repository.remove(&backup.key)? {
                removed.push(backup.key);
            }
        }

        if !removed.is_empty() {
            Logger::info(
                "OLD_BACKUPS_PRUNED",
                &[("removed", removed.len().to_string().as_str())],
            );
            self.metrics.add_backups_pruned(removed.len() as u64);
            self.events.notify(StorageEvent::OldBackupsCleanedUp {
                removed: removed.clone(),
            });
        }
        Ok(removed)
    }

    fn restore_from_backup(&self, key: &str, options: RestoreOptions) -> BackupResult<RestoreReport> {
        let blob = self
            .repository
            .get(key)?
            .ok_or_else(|| BackupError::NotFound(key.to_string()))?;

        self.events.notify(StorageEvent::RestoreStarted {
            key: key.to_string(),
        });
        let scope = ObservationScope::with_fields("RESTORE", &[("key", key)]);

        let outcome = ParsedSnapshot::parse(&blob)
            .and_then(|parsed| self.store.import_snapshot(parsed, options))
            .map_err(BackupError::from);
        let report = match outcome {
            Ok(report) => report,
            Err(err) => {
                scope.fail(&err.to_string());
                return Err(err);
            }
        };

        scope.complete_with_fields(&[
            ("imported", report.imported.to_string().as_str()),
            ("skipped", report.skipped.to_string().as_str()),
            ("errors", report.errors.len().to_string().as_str()),
        ]);
        self.metrics.increment_restores();
        self.events.notify(StorageEvent::RestoreCompleted {
            key: key.to_string(),
            report: report.clone(),
        });
        Ok(report)
    }

    /// Body of one scheduled tick; never propagates
    fn tick(&self) {
        if let Err(err) = self.perform_auto_backup() {
            self.metrics.increment_cycle_failures();
            Logger::error(
                "BACKUP_CYCLE_FAILED",
                &[("code", err.code()), ("reason", err.to_string().as_str())],
            );
            self.events
                .notify(StorageEvent::error("backup_manager", err.to_string()));
        }
    }
}

#[derive(Debug, Default)]
struct BackupTimer {
    started: bool,
    schedule: Option<ScheduleHandle>,
}

/// Creates, lists, prunes and restores backups
///
/// ```ignore
/// let backups = BackupManager::new(store, repository, events, scheduler, BackupConfig::default());
/// let key = backups.perform_auto_backup()?;
/// let report = backups.restore_from_backup(&key, RestoreOptions::default())?;
/// ```
#[derive(Debug)]
pub struct BackupManager {
    core: Arc<BackupCore>,
    scheduler: Arc<dyn Scheduler>,
    timer: Mutex<BackupTimer>,
}

impl BackupManager {
    pub fn new(
        store: Arc<RecordStore>,
        repository: Arc<dyn BackupRepository>,
        events: Arc<EventBus>,
        scheduler: Arc<dyn Scheduler>,
        config: BackupConfig,
    ) -> Self {
        let metrics = Arc::clone(store.metrics());
        Self {
            core: Arc::new(BackupCore {
                store,
                repository,
                config: RwLock::new(config),
                events,
                metrics,
            }),
            scheduler,
            timer: Mutex::new(BackupTimer::default()),
        }
    }

    /// Snapshot the corpus, then prune expired backups. Returns the new key.
    pub fn perform_auto_backup(&self) -> BackupResult<String> {
        self.core.perform_auto_backup()
    }

    /// Backups under the `autobackup_` prefix, newest first
    pub fn get_available_backups(&self) -> BackupResult<Vec<BackupInfo>> {
        self.core.get_available_backups()
    }

    pub fn latest_backup(&self) -> BackupResult<Option<BackupInfo>> {
        Ok(self.core.get_available_backups()?.into_iter().next())
    }

    /// Remove backups older than `max_backup_age`, returning their keys
    pub fn cleanup_old_backups(&self) -> BackupResult<Vec<String>> {
        self.core.cleanup_old_backups()
    }

    /// Remove one backup; `NotFound` if it does not exist
    pub fn delete_backup(&self, key: &str) -> BackupResult<()> {
        if self.core.repository.remove(key)? {
            Logger::info("BACKUP_DELETED", &[("key", key)]);
            Ok(())
        } else {
            Err(BackupError::NotFound(key.to_string()))
        }
    }

    pub fn restore_from_backup(&self, key: &str, options: RestoreOptions) -> BackupResult<RestoreReport> {
        self.core.restore_from_backup(key, options)
    }

    pub fn config(&self) -> BackupResult<BackupConfig> {
        self.core.config()
    }

    /// Begin timed backups if enabled; no-op when already started
    pub fn start(&self) -> BackupResult<()> {
        let mut timer = self.timer.lock().map_err(|_| BackupError::poisoned())?;
        if timer.started {
            return Ok(());
        }
        timer.started = true;
        let config = self.core.config()?;
        if config.auto_backup_enabled {
            timer.schedule = Some(self.arm(&config));
        }
        Ok(())
    }

    /// Stop timed backups; no-op when not started
    pub fn stop(&self) -> BackupResult<()> {
        let mut timer = self.timer.lock().map_err(|_| BackupError::poisoned())?;
        timer.started = false;
        if let Some(handle) = timer.schedule.take() {
            handle.cancel();
            Logger::info("BACKUP_TIMER_STOPPED", &[]);
        }
        Ok(())
    }

    /// Whether the backup timer is armed
    pub fn is_scheduled(&self) -> bool {
        self.timer
            .lock()
            .map(|timer| timer.schedule.is_some())
            .unwrap_or(false)
    }

    /// Replace the configuration. While started, the timer follows
    /// `auto_backup_enabled` and is re-armed when the interval changes.
    pub fn update_config(&self, config: BackupConfig) -> BackupResult<()> {
        config.validate()?;

        let previous = {
            let mut current = self.core.config.write().map_err(|_| BackupError::poisoned())?;
            std::mem::replace(&mut *current, config.clone())
        };

        let mut timer = self.timer.lock().map_err(|_| BackupError::poisoned())?;
        if !timer.started {
            return Ok(());
        }
        if !config.auto_backup_enabled {
            timer.schedule = None;
        } else if timer.schedule.is_none()
            || previous.backup_interval_ms != config.backup_interval_ms
        {
            timer.schedule = Some(self.arm(&config));
        }
        Ok(())
    }

    fn arm(&self, config: &BackupConfig) -> ScheduleHandle {
        let interval = config.backup_interval();
        let core = Arc::clone(&self.core);
        Logger::info(
            "BACKUP_TIMER_STARTED",
            &[("interval_ms", interval.as_millis().to_string().as_str())],
        );
        self.scheduler
            .schedule_repeating(interval, Arc::new(move || core.tick()))
    }
}
