//! Eviction Invariant Tests
//!
//! - Eviction never goes below the retention floor
//! - Eviction never raises usage
//! - Evicted records are exactly the oldest ones
//! - A cleanup pass with usage at or below the threshold changes nothing
//! - Records deleted by someone else during a pass are not counted
//! - A pass sizes each record a bounded number of times

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use manifestdb::capacity::CapacityMonitor;
use manifestdb::clock::ManualClock;
use manifestdb::config::CapacityConfig;
use manifestdb::events::{EventBus, StorageEvent};
use manifestdb::scheduler::ManualScheduler;
use manifestdb::store::{MemoryBackend, RecordStore, StoredRecord};
use manifestdb::usage::{FixedQuota, SizeEstimator, UsageEstimator};
use serde_json::json;

// =============================================================================
// Test Utilities
// =============================================================================

/// Every record weighs the same
#[derive(Debug)]
struct FlatSize(u64);

impl SizeEstimator for FlatSize {
    fn estimate_size(&self, _record: &StoredRecord) -> u64 {
        self.0
    }
}

struct Harness {
    store: Arc<RecordStore>,
    clock: Arc<ManualClock>,
    usage: Arc<UsageEstimator>,
    events: Arc<EventBus>,
    monitor: CapacityMonitor,
}

fn harness(record_size: u64, quota: u64, config: CapacityConfig) -> Harness {
    let clock = Arc::new(ManualClock::at_millis(1_767_225_600_000));
    let store = Arc::new(RecordStore::open(Box::new(MemoryBackend::new()), clock.clone()).unwrap());
    let usage = Arc::new(
        UsageEstimator::new(Arc::clone(&store))
            .with_size_estimator(FlatSize(record_size))
            .with_quota_provider(FixedQuota::new(quota)),
    );
    let events = Arc::new(EventBus::new());
    let monitor = CapacityMonitor::new(
        Arc::clone(&store),
        Arc::clone(&usage),
        Arc::clone(&events),
        Arc::new(ManualScheduler::new()),
        config,
    );
    Harness {
        store,
        clock,
        usage,
        events,
        monitor,
    }
}

/// Save `n` records one second apart, returning ids oldest first
fn fill(h: &Harness, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            h.clock.advance(chrono::Duration::seconds(1));
            h.store
                .save(json!({ "flightNumber": format!("BA{}", 100 + i) }))
                .unwrap()
        })
        .collect()
}

// =============================================================================
// Worked Scenario
// =============================================================================

/// 12 records at 85% with threshold 80, target 70, floor 10: exactly the two
/// oldest go, usage stays above target.
#[test]
fn test_twelve_records_at_85_percent_deletes_two() {
    // 12 x 85 = 1020 of 1200 bytes = 85%
    let h = harness(85, 1_200, CapacityConfig::default());
    let ids = fill(&h, 12);
    let usage = h.usage.get_usage_info().unwrap();
    assert!((usage.usage_percentage - 85.0).abs() < 1e-9);

    let report = h.monitor.check_and_cleanup().unwrap();

    assert!(report.cleanup_performed);
    assert_eq!(report.deleted_count, 2);
    assert_eq!(report.remaining_count, 10);
    assert!(report.new_usage_percentage > 70.0);
    assert!(!h.store.contains(&ids[0]).unwrap());
    assert!(!h.store.contains(&ids[1]).unwrap());
    for id in &ids[2..] {
        assert!(h.store.contains(id).unwrap());
    }
}

// =============================================================================
// Retention Floor
// =============================================================================

/// Whatever the usage, a pass never leaves fewer than min_retain_count
/// records when it started with at least that many.
#[test]
fn test_floor_holds_for_any_starting_count() {
    for start in [0usize, 1, 5, 10, 11, 25] {
        let h = harness(100, 100, CapacityConfig {
            min_retain_count: 5,
            ..Default::default()
        });
        fill(&h, start);

        let report = h.monitor.check_and_cleanup().unwrap();

        let remaining = h.store.count().unwrap();
        assert_eq!(remaining, report.remaining_count);
        assert!(
            remaining >= start.min(5),
            "started with {}, left {}",
            start,
            remaining
        );
    }
}

// =============================================================================
// Monotonicity and Order
// =============================================================================

#[test]
fn test_usage_never_increases() {
    let h = harness(50, 1_000, CapacityConfig {
        min_retain_count: 0,
        ..Default::default()
    });
    fill(&h, 19);
    let before = h.usage.get_usage_info().unwrap().usage_percentage;

    let report = h.monitor.check_and_cleanup().unwrap();

    assert!(report.new_usage_percentage <= before);
    assert!(report.new_usage_percentage <= 70.0);
}

#[test]
fn test_evicted_set_is_oldest_prefix() {
    let h = harness(10, 200, CapacityConfig {
        min_retain_count: 0,
        ..Default::default()
    });
    // Saved out of id order; creation time decides
    let ids = fill(&h, 20);

    let report = h.monitor.check_and_cleanup().unwrap();

    // 100% -> 70% means 6 of 20 go
    assert_eq!(report.deleted_count, 6);
    for (position, id) in ids.iter().enumerate() {
        assert_eq!(
            h.store.contains(id).unwrap(),
            position >= 6,
            "record {} has the wrong fate",
            position
        );
    }
}

#[test]
fn test_at_threshold_nothing_happens() {
    // Exactly 80%
    let h = harness(100, 1_000, CapacityConfig {
        min_retain_count: 0,
        ..Default::default()
    });
    fill(&h, 8);

    let report = h.monitor.check_and_cleanup().unwrap();

    assert!(!report.cleanup_performed);
    assert_eq!(h.store.count().unwrap(), 8);
}

// =============================================================================
// Concurrent Deletes
// =============================================================================

/// A listener deletes the oldest record as cleanup starts; the pass skips it
/// and reports only what it deleted itself.
#[test]
fn test_record_deleted_mid_pass_is_not_counted() {
    let h = harness(100, 1_000, CapacityConfig {
        min_retain_count: 0,
        ..Default::default()
    });
    let ids = fill(&h, 10);

    let store = Arc::clone(&h.store);
    let oldest = ids[0].clone();
    h.events.add_listener(move |event| {
        if let StorageEvent::CleanupStarted(_) = event {
            store.delete(&oldest).map_err(|e| e.to_string())?;
        }
        Ok(())
    });

    let report = h.monitor.check_and_cleanup().unwrap();

    // 10 -> 7 records; the listener removed one of the three
    assert_eq!(report.deleted_count, 2);
    assert_eq!(report.remaining_count, 7);
    assert_eq!(h.store.count().unwrap(), 7);
    for id in &ids[3..] {
        assert!(h.store.contains(id).unwrap());
    }
    assert_eq!(h.store.metrics().snapshot().records_evicted, 2);
}

// =============================================================================
// Pass Cost
// =============================================================================

/// Flat size that counts how often it is asked
#[derive(Debug)]
struct CountingSize {
    size: u64,
    calls: Arc<AtomicUsize>,
}

impl SizeEstimator for CountingSize {
    fn estimate_size(&self, _record: &StoredRecord) -> u64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.size
    }
}

/// Evicting a large share of the corpus must not rescan it per delete
#[test]
fn test_pass_sizes_records_linearly() {
    let clock = Arc::new(ManualClock::at_millis(1_767_225_600_000));
    let store = Arc::new(RecordStore::open(Box::new(MemoryBackend::new()), clock.clone()).unwrap());
    for i in 0..200 {
        clock.advance(chrono::Duration::seconds(1));
        store.save(json!({ "seq": i })).unwrap();
    }
    let calls = Arc::new(AtomicUsize::new(0));
    let usage = Arc::new(
        UsageEstimator::new(Arc::clone(&store))
            .with_size_estimator(CountingSize {
                size: 10,
                calls: Arc::clone(&calls),
            })
            .with_quota_provider(FixedQuota::new(2_000)),
    );
    let monitor = CapacityMonitor::new(
        Arc::clone(&store),
        usage,
        Arc::new(EventBus::new()),
        Arc::new(ManualScheduler::new()),
        CapacityConfig {
            min_retain_count: 0,
            ..Default::default()
        },
    );

    let report = monitor.check_and_cleanup().unwrap();

    // 2000 of 2000 bytes down to 1400: 60 deletes
    assert_eq!(report.deleted_count, 60);
    assert_eq!(report.remaining_count, 140);
    assert!((report.new_usage_percentage - 70.0).abs() < 1e-9);
    assert!(calls.load(Ordering::SeqCst) <= 3 * 200);
}

// =============================================================================
// Events
// =============================================================================

#[test]
fn test_cleanup_completed_carries_report() {
    let h = harness(100, 1_000, CapacityConfig {
        min_retain_count: 0,
        ..Default::default()
    });
    fill(&h, 10);

    let completed = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&completed);
    h.events.add_listener(move |event| {
        if let StorageEvent::CleanupCompleted(report) = event {
            *sink.lock().unwrap() = Some(report.clone());
        }
        Ok(())
    });

    let report = h.monitor.check_and_cleanup().unwrap();
    assert_eq!(completed.lock().unwrap().as_ref(), Some(&report));
}
