//! # Capacity Monitor
//!
//! Periodically compares usage with the configured threshold and evicts the
//! oldest records until usage drops to the target.
//!
//! # Eviction Rules
//!
//! - Nothing happens while `usage_percentage <= cleanup_threshold`
//! - Records go strictly oldest `created_at` first; ties keep `get_all` order
//! - Usage is tracked across the pass: the count is re-read after every
//!   delete and locally estimated bytes are reduced by the evicted record's
//!   size; the pass stops at `target_usage` or when the remaining count
//!   reaches `min_retain_count`
//! - A record deleted by someone else mid-pass is skipped, not counted
//!
//! The monitor is either idle or running. A running monitor owns exactly one
//! armed schedule; a failing pass is reported and the schedule keeps going.

mod errors;

pub use errors::{CapacityError, CapacityResult};

use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::config::CapacityConfig;
use crate::events::{EventBus, StorageEvent};
use crate::observability::{Logger, ObservationScope, StorageMetrics};
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::store::RecordStore;
use crate::usage::{UsageEstimator, UsageInfo};

/// Outcome of one `check_and_cleanup`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub cleanup_performed: bool,
    pub deleted_count: usize,
    pub remaining_count: usize,
    pub new_usage_percentage: f64,
}

impl CleanupReport {
    fn skipped(usage: &UsageInfo) -> Self {
        Self {
            cleanup_performed: false,
            deleted_count: 0,
            remaining_count: usage.count,
            new_usage_percentage: usage.usage_percentage,
        }
    }
}

/// State shared between the monitor and its scheduled ticks
#[derive(Debug)]
struct MonitorCore {
    store: Arc<RecordStore>,
    usage: Arc<UsageEstimator>,
    config: RwLock<CapacityConfig>,
    events: Arc<EventBus>,
    metrics: Arc<StorageMetrics>,
}

impl MonitorCore {
    fn config(&self) -> CapacityResult<CapacityConfig> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| CapacityError::poisoned())
    }

    fn check_and_cleanup(&self) -> CapacityResult<CleanupReport> {
        let config = self.config()?;
        let usage = self.usage.get_usage_info()?;
        self.events.notify(StorageEvent::StorageChecked(usage));

        if usage.usage_percentage <= config.cleanup_threshold {
            return Ok(CleanupReport::skipped(&usage));
        }

        self.events.notify(StorageEvent::CleanupStarted(usage));
        let percent = format!("{:.2}", usage.usage_percentage);
        let scope = ObservationScope::with_fields(
            "CLEANUP",
            &[
                ("usage_percentage", percent.as_str()),
                ("count", usage.count.to_string().as_str()),
            ],
        );

        let report = match self.evict(&config) {
            Ok(report) => report,
            Err(err) => {
                scope.fail(&err.to_string());
                return Err(err);
            }
        };

        let new_percent = format!("{:.2}", report.new_usage_percentage);
        scope.complete_with_fields(&[
            ("deleted", report.deleted_count.to_string().as_str()),
            ("remaining", report.remaining_count.to_string().as_str()),
            ("usage_percentage", new_percent.as_str()),
        ]);

        self.metrics.increment_cleanup_passes();
        self.metrics.add_evicted(report.deleted_count as u64);
        self.events.notify(StorageEvent::CleanupCompleted(report.clone()));
        Ok(report)
    }

    fn evict(&self, config: &CapacityConfig) -> CapacityResult<CleanupReport> {
        let mut candidates = self.store.get_all(None)?;
        // Stable: equal creation times keep get_all order.
        candidates.sort_by_key(|record| record.created_at);

        let mut running = self.usage.running(&candidates)?;
        let mut usage = running.info();
        let mut deleted = 0;
        for record in &candidates {
            if usage.usage_percentage <= config.target_usage || usage.count <= config.min_retain_count {
                break;
            }
            if !self.store.contains(&record.id)? {
                continue;
            }

            self.store.delete(&record.id)?;
            deleted += 1;
            Logger::trace("RECORD_EVICTED", &[("id", record.id.as_str())]);

            usage = running.removed(record)?;
        }

        Ok(CleanupReport {
            cleanup_performed: true,
            deleted_count: deleted,
            remaining_count: usage.count,
            new_usage_percentage: usage.usage_percentage,
        })
    }

    /// Body of one scheduled tick; never propagates
    fn tick(&self) {
        if let Err(err) = self.check_and_cleanup() {
            self.metrics.increment_cycle_failures();
            Logger::error(
                "CAPACITY_CYCLE_FAILED",
                &[("code", err.code()), ("reason", err.to_string().as_str())],
            );
            self.events
                .notify(StorageEvent::error("capacity_monitor", err.to_string()));
        }
    }
}

/// Threshold-driven eviction on a repeating schedule
///
/// ```ignore
/// let monitor = CapacityMonitor::new(store, usage, events, scheduler, CapacityConfig::default());
/// monitor.start();
/// let report = monitor.check_and_cleanup()?;
/// monitor.stop();
/// ```
#[derive(Debug)]
pub struct CapacityMonitor {
    core: Arc<MonitorCore>,
    scheduler: Arc<dyn Scheduler>,
    schedule: Mutex<Option<ScheduleHandle>>,
}

impl CapacityMonitor {
    pub fn new(
        store: Arc<RecordStore>,
        usage: Arc<UsageEstimator>,
        events: Arc<EventBus>,
        scheduler: Arc<dyn Scheduler>,
        config: CapacityConfig,
    ) -> Self {
        let metrics = Arc::clone(store.metrics());
        Self {
            core: Arc::new(MonitorCore {
                store,
                usage,
                config: RwLock::new(config),
                events,
                metrics,
            }),
            scheduler,
            schedule: Mutex::new(None),
        }
    }

    /// Arm the monitor loop; no-op while running
    pub fn start(&self) -> CapacityResult<()> {
        let mut schedule = self.schedule.lock().map_err(|_| CapacityError::poisoned())?;
        if schedule.is_some() {
            return Ok(());
        }
        *schedule = Some(self.arm()?);
        Ok(())
    }

    /// Disarm the monitor loop; no-op while idle. A pass already running
    /// finishes.
    pub fn stop(&self) -> CapacityResult<()> {
        let mut schedule = self.schedule.lock().map_err(|_| CapacityError::poisoned())?;
        if let Some(handle) = schedule.take() {
            handle.cancel();
            Logger::info("CAPACITY_MONITOR_STOPPED", &[]);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.schedule
            .lock()
            .map(|schedule| schedule.is_some())
            .unwrap_or(false)
    }

    /// One check-and-evict pass, outside the schedule
    pub fn check_and_cleanup(&self) -> CapacityResult<CleanupReport> {
        self.core.check_and_cleanup()
    }

    pub fn config(&self) -> CapacityResult<CapacityConfig> {
        self.core.config()
    }

    /// Replace the configuration. A running loop is re-armed when the
    /// monitoring interval changes.
    pub fn update_config(&self, config: CapacityConfig) -> CapacityResult<()> {
        config.validate()?;

        let previous = {
            let mut current = self.core.config.write().map_err(|_| CapacityError::poisoned())?;
            std::mem::replace(&mut *current, config.clone())
        };

        if previous.monitoring_interval_ms != config.monitoring_interval_ms {
            let mut schedule = self.schedule.lock().map_err(|_| CapacityError::poisoned())?;
            if let Some(handle) = schedule.take() {
                handle.cancel();
                *schedule = Some(self.arm()?);
            }
        }
        Ok(())
    }

    fn arm(&self) -> CapacityResult<ScheduleHandle> {
        let interval = self.core.config()?.monitoring_interval();
        let core = Arc::clone(&self.core);
        let handle = self
            .scheduler
            .schedule_repeating(interval, Arc::new(move || core.tick()));

        Logger::info(
            "CAPACITY_MONITOR_STARTED",
            &[("interval_ms", interval.as_millis().to_string().as_str())],
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventKind;
    use crate::scheduler::ManualScheduler;
    use crate::store::{MemoryBackend, StoredRecord};
    use crate::usage::{FixedQuota, SizeEstimator};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug)]
    struct FlatSize(u64);

    impl SizeEstimator for FlatSize {
        fn estimate_size(&self, _record: &StoredRecord) -> u64 {
            self.0
        }
    }

    struct Fixture {
        store: Arc<RecordStore>,
        clock: Arc<ManualClock>,
        events: Arc<EventBus>,
        scheduler: Arc<ManualScheduler>,
        monitor: CapacityMonitor,
    }

    /// Each record weighs 100 bytes against `quota`
    fn fixture(quota: u64, config: CapacityConfig) -> Fixture {
        let clock = Arc::new(ManualClock::at_millis(1_767_225_600_000));
        let store = Arc::new(
            RecordStore::open(Box::new(MemoryBackend::new()), clock.clone()).unwrap(),
        );
        let usage = Arc::new(
            UsageEstimator::new(Arc::clone(&store))
                .with_size_estimator(FlatSize(100))
                .with_quota_provider(FixedQuota::new(quota)),
        );
        let events = Arc::new(EventBus::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let monitor = CapacityMonitor::new(
            Arc::clone(&store),
            usage,
            Arc::clone(&events),
            scheduler.clone(),
            config,
        );
        Fixture {
            store,
            clock,
            events,
            scheduler,
            monitor,
        }
    }

    fn fill(fx: &Fixture, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                fx.clock.advance(chrono::Duration::seconds(1));
                fx.store.save(json!({ "seq": i })).unwrap()
            })
            .collect()
    }

    fn record_kinds(events: &EventBus) -> Arc<Mutex<Vec<EventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.add_listener(move |event| {
            sink.lock().unwrap().push(event.kind());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_below_threshold_is_noop() {
        let fx = fixture(10_000, CapacityConfig::default());
        fill(&fx, 5);
        let seen = record_kinds(&fx.events);

        let report = fx.monitor.check_and_cleanup().unwrap();

        assert!(!report.cleanup_performed);
        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.remaining_count, 5);
        assert_eq!(fx.store.count().unwrap(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::StorageChecked]);
    }

    #[test]
    fn test_evicts_oldest_until_target() {
        // 20 records x 100 bytes over 2_200 = 90.9%
        let fx = fixture(2_200, CapacityConfig {
            min_retain_count: 0,
            ..Default::default()
        });
        let ids = fill(&fx, 20);
        let seen = record_kinds(&fx.events);

        let report = fx.monitor.check_and_cleanup().unwrap();

        // 15 records = 68.2% is the first count at or below 70%
        assert!(report.cleanup_performed);
        assert_eq!(report.deleted_count, 5);
        assert_eq!(report.remaining_count, 15);
        assert!(report.new_usage_percentage <= 70.0);
        for id in &ids[..5] {
            assert!(!fx.store.contains(id).unwrap());
        }
        for id in &ids[5..] {
            assert!(fx.store.contains(id).unwrap());
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventKind::StorageChecked,
                EventKind::CleanupStarted,
                EventKind::CleanupCompleted
            ]
        );
        let metrics = fx.store.metrics().snapshot();
        assert_eq!(metrics.records_evicted, 5);
        assert_eq!(metrics.cleanup_passes, 1);
    }

    #[test]
    fn test_retention_floor_stops_eviction() {
        // 12 records at 85%: the floor of 10 is hit before the target
        let fx = fixture(1_412, CapacityConfig::default());
        let ids = fill(&fx, 12);

        let report = fx.monitor.check_and_cleanup().unwrap();

        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.remaining_count, 10);
        assert!(report.new_usage_percentage > 70.0);
        assert!(!fx.store.contains(&ids[0]).unwrap());
        assert!(!fx.store.contains(&ids[1]).unwrap());
        assert!(fx.store.contains(&ids[2]).unwrap());
    }

    #[test]
    fn test_never_deletes_below_floor() {
        let fx = fixture(100, CapacityConfig {
            min_retain_count: 3,
            ..Default::default()
        });
        fill(&fx, 3);

        let report = fx.monitor.check_and_cleanup().unwrap();

        assert!(report.cleanup_performed);
        assert_eq!(report.deleted_count, 0);
        assert_eq!(fx.store.count().unwrap(), 3);
    }

    #[test]
    fn test_equal_timestamps_keep_listing_order() {
        let fx = fixture(1_000, CapacityConfig {
            min_retain_count: 0,
            ..Default::default()
        });
        // Same created_at for every record
        for i in 0..10 {
            fx.store.save(json!({ "seq": i })).unwrap();
        }
        let listing: Vec<String> = fx
            .store
            .get_all(None)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        let report = fx.monitor.check_and_cleanup().unwrap();

        assert_eq!(report.deleted_count, 3);
        for id in &listing[..3] {
            assert!(!fx.store.contains(id).unwrap());
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let fx = fixture(10_000, CapacityConfig::default());

        fx.monitor.stop().unwrap();
        assert!(!fx.monitor.is_running());

        fx.monitor.start().unwrap();
        fx.monitor.start().unwrap();
        assert!(fx.monitor.is_running());
        assert_eq!(fx.scheduler.active_count(), 1);

        fx.monitor.stop().unwrap();
        fx.monitor.stop().unwrap();
        assert!(!fx.monitor.is_running());
        assert_eq!(fx.scheduler.active_count(), 0);
    }

    #[test]
    fn test_scheduled_ticks_run_cleanup() {
        let fx = fixture(1_000, CapacityConfig {
            min_retain_count: 0,
            ..Default::default()
        });
        let seen = record_kinds(&fx.events);
        fx.monitor.start().unwrap();

        fx.scheduler.advance(Duration::from_secs(299));
        assert!(seen.lock().unwrap().is_empty());

        fx.scheduler.advance(Duration::from_secs(1));
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::StorageChecked]);

        fill(&fx, 10);
        fx.scheduler.advance(Duration::from_secs(300));
        assert_eq!(fx.store.count().unwrap(), 7);

        fx.monitor.stop().unwrap();
        fill(&fx, 3);
        assert_eq!(fx.scheduler.advance(Duration::from_secs(3_000)), 0);
        assert_eq!(fx.store.count().unwrap(), 10);
    }

    #[test]
    fn test_update_config_rearms_on_interval_change() {
        let fx = fixture(10_000, CapacityConfig::default());
        let seen = record_kinds(&fx.events);
        fx.monitor.start().unwrap();

        fx.monitor
            .update_config(CapacityConfig {
                monitoring_interval_ms: 60_000,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(fx.scheduler.active_count(), 1);
        fx.scheduler.advance(Duration::from_secs(60));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(fx.monitor.config().unwrap().monitoring_interval_ms, 60_000);
    }

    #[test]
    fn test_update_config_while_idle_stays_idle() {
        let fx = fixture(10_000, CapacityConfig::default());
        fx.monitor
            .update_config(CapacityConfig {
                monitoring_interval_ms: 1_000,
                ..Default::default()
            })
            .unwrap();
        assert!(!fx.monitor.is_running());
        assert_eq!(fx.scheduler.active_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let fx = fixture(10_000, CapacityConfig::default());
        let err = fx
            .monitor
            .update_config(CapacityConfig {
                cleanup_threshold: 50.0,
                target_usage: 60.0,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CapacityError::Config(_)));
        assert_eq!(fx.monitor.config().unwrap(), CapacityConfig::default());
    }
}
