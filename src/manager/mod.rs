//! # Storage Manager
//!
//! Owns one record store together with its capacity monitor, backup manager,
//! query layer and event bus, and drives their shared lifecycle.
//!
//! There is no process-wide instance: every manager is built explicitly from
//! its collaborators, so several can coexist (one per data directory).
//!
//! - `start` arms the monitor loop and, when enabled, the backup timer
//! - `stop` disarms both; passes already running finish
//! - `update_config` validates first and applies to both subsystems

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::backup::{BackupError, BackupManager, BackupRepository};
use crate::capacity::{CapacityError, CapacityMonitor, CleanupReport};
use crate::config::{ConfigError, ManagerConfig};
use crate::events::{EventBus, ListenerError, ListenerId, StorageEvent};
use crate::observability::{Logger, MetricsSnapshot};
use crate::query::RecordQuery;
use crate::scheduler::Scheduler;
use crate::store::{RecordStore, StoreError};
use crate::usage::{UsageError, UsageEstimator, UsageInfo};

/// Errors surfaced by the manager facade
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ManagerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ManagerError {
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::Config(err) => err.code(),
            ManagerError::Capacity(err) => err.code(),
            ManagerError::Backup(err) => err.code(),
            ManagerError::Usage(err) => err.code(),
            ManagerError::Store(err) => err.code(),
            ManagerError::Internal(_) => "MDB_MANAGER_INTERNAL",
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Aggregate view for status displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub usage: UsageInfo,
    pub oldest_record: Option<DateTime<Utc>>,
    pub newest_record: Option<DateTime<Utc>>,
    pub backup_count: usize,
    pub latest_backup: Option<DateTime<Utc>>,
    pub monitoring: bool,
    pub auto_backup_scheduled: bool,
    pub metrics: MetricsSnapshot,
}

/// Facade over one store and its background subsystems
///
/// ```ignore
/// let manager = StorageManager::new(store, usage, repository, scheduler, ManagerConfig::default())?;
/// manager.add_listener(|event| { refresh_counters(event); Ok(()) });
/// manager.start()?;
/// ```
#[derive(Debug)]
pub struct StorageManager {
    store: Arc<RecordStore>,
    usage: Arc<UsageEstimator>,
    events: Arc<EventBus>,
    monitor: CapacityMonitor,
    backups: BackupManager,
    query: RecordQuery,
    running: Mutex<bool>,
}

impl StorageManager {
    pub fn new(
        store: Arc<RecordStore>,
        usage: UsageEstimator,
        repository: Arc<dyn BackupRepository>,
        scheduler: Arc<dyn Scheduler>,
        config: ManagerConfig,
    ) -> ManagerResult<Self> {
        config.validate()?;

        let usage = Arc::new(usage);
        let events = Arc::new(EventBus::new().with_metrics(Arc::clone(store.metrics())));
        let monitor = CapacityMonitor::new(
            Arc::clone(&store),
            Arc::clone(&usage),
            Arc::clone(&events),
            Arc::clone(&scheduler),
            config.capacity,
        );
        let backups = BackupManager::new(
            Arc::clone(&store),
            repository,
            Arc::clone(&events),
            scheduler,
            config.backup,
        );
        let query = RecordQuery::new(Arc::clone(&store));

        Ok(Self {
            store,
            usage,
            events,
            monitor,
            backups,
            query,
            running: Mutex::new(false),
        })
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn usage(&self) -> &UsageEstimator {
        &self.usage
    }

    pub fn query(&self) -> &RecordQuery {
        &self.query
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn monitor(&self) -> &CapacityMonitor {
        &self.monitor
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.events.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Arm background work; no-op while running
    pub fn start(&self) -> ManagerResult<()> {
        let mut running = self.lock_running()?;
        if *running {
            return Ok(());
        }

        self.monitor.start()?;
        if let Err(err) = self.backups.start() {
            self.monitor.stop()?;
            return Err(err.into());
        }
        *running = true;

        Logger::info("STORAGE_MANAGER_STARTED", &[]);
        self.events.notify(StorageEvent::Started);
        Ok(())
    }

    /// Disarm background work; no-op while idle
    pub fn stop(&self) -> ManagerResult<()> {
        let mut running = self.lock_running()?;
        if !*running {
            return Ok(());
        }

        self.monitor.stop()?;
        self.backups.stop()?;
        *running = false;

        Logger::info("STORAGE_MANAGER_STOPPED", &[]);
        self.events.notify(StorageEvent::Stopped);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|running| *running).unwrap_or(false)
    }

    pub fn config(&self) -> ManagerResult<ManagerConfig> {
        Ok(ManagerConfig {
            capacity: self.monitor.config()?,
            backup: self.backups.config()?,
        })
    }

    /// Validate and apply a new configuration to both subsystems
    pub fn update_config(&self, config: ManagerConfig) -> ManagerResult<()> {
        config.validate()?;
        self.monitor.update_config(config.capacity.clone())?;
        self.backups.update_config(config.backup.clone())?;

        Logger::info("STORAGE_CONFIG_UPDATED", &[]);
        self.events.notify(StorageEvent::ConfigUpdated(config));
        Ok(())
    }

    /// Run one check-and-evict pass now
    pub fn force_cleanup(&self) -> ManagerResult<CleanupReport> {
        Ok(self.monitor.check_and_cleanup()?)
    }

    pub fn storage_stats(&self) -> ManagerResult<StorageStats> {
        let usage = self.usage.get_usage_info()?;
        let (oldest_record, newest_record) = self.store.created_bounds()?;
        let backups = self.backups.get_available_backups()?;

        Ok(StorageStats {
            usage,
            oldest_record,
            newest_record,
            backup_count: backups.len(),
            latest_backup: backups.first().map(|b| b.timestamp),
            monitoring: self.monitor.is_running(),
            auto_backup_scheduled: self.backups.is_scheduled(),
            metrics: self.store.metrics().snapshot(),
        })
    }

    fn lock_running(&self) -> ManagerResult<std::sync::MutexGuard<'_, bool>> {
        self.running
            .lock()
            .map_err(|_| ManagerError::Internal("Lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryBackupRepository;
    use crate::clock::ManualClock;
    use crate::config::CapacityConfig;
    use crate::events::EventKind;
    use crate::scheduler::ManualScheduler;
    use crate::store::MemoryBackend;
    use crate::usage::FixedQuota;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> (StorageManager, Arc<ManualScheduler>, Arc<Mutex<Vec<EventKind>>>) {
        let clock = Arc::new(ManualClock::at_millis(1_767_225_600_000));
        let store = Arc::new(
            RecordStore::open(Box::new(MemoryBackend::new()), clock).unwrap(),
        );
        let usage = UsageEstimator::new(Arc::clone(&store)).with_quota_provider(FixedQuota::new(1 << 20));
        let scheduler = Arc::new(ManualScheduler::new());
        let manager = StorageManager::new(
            store,
            usage,
            Arc::new(MemoryBackupRepository::new()),
            scheduler.clone(),
            ManagerConfig::default(),
        )
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.add_listener(move |event| {
            sink.lock().unwrap().push(event.kind());
            Ok(())
        });
        (manager, scheduler, seen)
    }

    #[test]
    fn test_lifecycle_events_once() {
        let (manager, scheduler, seen) = manager();

        manager.start().unwrap();
        manager.start().unwrap();
        assert!(manager.is_running());
        assert_eq!(scheduler.active_count(), 2);

        manager.stop().unwrap();
        manager.stop().unwrap();
        assert!(!manager.is_running());
        assert_eq!(scheduler.active_count(), 0);

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Started, EventKind::Stopped]);
    }

    #[test]
    fn test_ticks_drive_both_subsystems() {
        let (manager, scheduler, seen) = manager();
        manager.store().save(json!({"flight": "QF1"})).unwrap();
        manager.start().unwrap();

        scheduler.advance(Duration::from_secs(86_400));

        let kinds = seen.lock().unwrap().clone();
        // 288 monitor ticks in a day, one backup
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::StorageChecked).count(), 288);
        assert_eq!(kinds.iter().filter(|k| **k == EventKind::BackupCompleted).count(), 1);
        assert_eq!(manager.storage_stats().unwrap().backup_count, 1);
    }

    #[test]
    fn test_update_config_emits_and_applies() {
        let (manager, _, seen) = manager();
        let config = ManagerConfig {
            capacity: CapacityConfig {
                cleanup_threshold: 95.0,
                ..Default::default()
            },
            ..Default::default()
        };

        manager.update_config(config.clone()).unwrap();

        assert_eq!(manager.config().unwrap(), config);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::ConfigUpdated]);
    }

    #[test]
    fn test_invalid_config_changes_nothing() {
        let (manager, _, seen) = manager();
        let config = ManagerConfig {
            capacity: CapacityConfig {
                target_usage: 90.0,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = manager.update_config(config).unwrap_err();
        assert_eq!(err.code(), "MDB_CONFIG_TARGET_ABOVE_THRESHOLD");
        assert_eq!(manager.config().unwrap(), ManagerConfig::default());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_storage_stats() {
        let (manager, _, _) = manager();
        manager.store().save(json!({"flight": "EK2"})).unwrap();
        manager.backups().perform_auto_backup().unwrap();

        let stats = manager.storage_stats().unwrap();
        assert_eq!(stats.usage.count, 1);
        assert_eq!(stats.usage.quota, 1 << 20);
        assert!(stats.oldest_record.is_some());
        assert_eq!(stats.backup_count, 1);
        assert!(stats.latest_backup.is_some());
        assert!(!stats.monitoring);
        assert_eq!(stats.metrics.records_saved, 1);
        assert_eq!(stats.metrics.backups_created, 1);
    }
}
