//! Storage counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed ordering; exactness across threads is not required

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one storage manager instance
#[derive(Debug, Default)]
pub struct StorageMetrics {
    records_saved: AtomicU64,
    records_updated: AtomicU64,
    records_deleted: AtomicU64,
    records_evicted: AtomicU64,
    cleanup_passes: AtomicU64,
    backups_created: AtomicU64,
    backups_pruned: AtomicU64,
    restores_performed: AtomicU64,
    cycle_failures: AtomicU64,
    listener_failures: AtomicU64,
}

impl StorageMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_saved(&self) {
        self.records_saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updated(&self) {
        self.records_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deleted(&self) {
        self.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_evicted(&self, count: u64) {
        self.records_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_cleanup_passes(&self) {
        self.cleanup_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_backups(&self) {
        self.backups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_backups_pruned(&self, count: u64) {
        self.backups_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_restores(&self) {
        self.restores_performed.fetch_add(1, Ordering::Relaxed);
    }

    /// A scheduled cleanup or backup cycle failed
    pub fn increment_cycle_failures(&self) {
        self.cycle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_listener_failures(&self) {
        self.listener_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_saved: self.records_saved.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            records_deleted: self.records_deleted.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            cleanup_passes: self.cleanup_passes.load(Ordering::Relaxed),
            backups_created: self.backups_created.load(Ordering::Relaxed),
            backups_pruned: self.backups_pruned.load(Ordering::Relaxed),
            restores_performed: self.restores_performed.load(Ordering::Relaxed),
            cycle_failures: self.cycle_failures.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_saved: u64,
    pub records_updated: u64,
    pub records_deleted: u64,
    pub records_evicted: u64,
    pub cleanup_passes: u64,
    pub backups_created: u64,
    pub backups_pruned: u64,
    pub restores_performed: u64,
    pub cycle_failures: u64,
    pub listener_failures: u64,
}
