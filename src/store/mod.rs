//! Record store for manifestdb
//!
//! CRUD over opaque manifest records keyed by a generated id, with two
//! secondary orderings (creation time, update time).
//!
//! # Design Principles
//!
//! - Each operation is its own backend transaction
//! - No multi-record atomicity; a batch of deletes is a sequence of
//!   independent deletes
//! - `update` never touches `id` or `created_at`
//! - `updated_at >= created_at` for every record handed out
//!
//! The secondary orderings live in memory and are rebuilt from the backend
//! when the store is opened.

mod backend;
mod errors;
mod file;
mod index;
mod memory;
mod record;
mod snapshot;

pub use backend::RecordBackend;
pub use errors::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use record::{validate_id, DateRange, StoredRecord, MAX_ID_LEN};
pub use snapshot::{BackupSnapshot, ParsedSnapshot, RestoreOptions, RestoreReport, SNAPSHOT_VERSION};

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::observability::{Logger, StorageMetrics};

use index::RecordIndex;

/// The record store
///
/// ```ignore
/// let store = RecordStore::open(Box::new(FileBackend::open(&data_dir)?), Arc::new(SystemClock))?;
/// let id = store.save(json!({"flightNumber": "BA117"}))?;
/// let record = store.get(&id)?;
/// ```
#[derive(Debug)]
pub struct RecordStore {
    backend: Box<dyn RecordBackend>,
    clock: Arc<dyn Clock>,
    index: RwLock<RecordIndex>,
    metrics: Arc<StorageMetrics>,
}

impl RecordStore {
    /// Open a store over `backend`, rebuilding the orderings from its contents
    pub fn open(backend: Box<dyn RecordBackend>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let records = backend.list()?;
        let index = RecordIndex::rebuild(&records);

        Logger::info("STORE_OPENED", &[("records", records.len().to_string().as_str())]);

        Ok(Self {
            backend,
            clock,
            index: RwLock::new(index),
            metrics: Arc::new(StorageMetrics::new()),
        })
    }

    /// Volatile store on the system clock
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            clock: Arc::new(SystemClock),
            index: RwLock::new(RecordIndex::default()),
            metrics: Arc::new(StorageMetrics::new()),
        }
    }

    /// Share a counter registry with the rest of the manager
    pub fn with_metrics(mut self, metrics: Arc<StorageMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<StorageMetrics> {
        &self.metrics
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Persist a new record and return its id
    pub fn save(&self, payload: Value) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let record = StoredRecord::new(id.clone(), payload, self.clock.now());

        self.backend.put(&record)?;
        self.index_write()?.insert(&record);
        self.metrics.increment_saved();

        Logger::trace("RECORD_SAVED", &[("id", id.as_str())]);
        Ok(id)
    }

    /// Replace the payload of an existing record
    pub fn update(&self, id: &str, payload: Value) -> StoreResult<()> {
        let mut record = self
            .backend
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        record.payload = payload;
        record.updated_at = self.clock.now().max(record.created_at);

        self.backend.put(&record)?;
        self.index_write()?.insert(&record);
        self.metrics.increment_updated();

        Logger::trace("RECORD_UPDATED", &[("id", id)]);
        Ok(())
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        self.backend.get(id)
    }

    /// Records created inside `range` oldest first, or the whole corpus in
    /// backend-native order when no range is given
    pub fn get_all(&self, range: Option<&DateRange>) -> StoreResult<Vec<StoredRecord>> {
        let range = match range {
            Some(range) => range,
            None => return self.backend.list(),
        };

        let ids = self.index_read()?.created_in(range);
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            // Deleted since the index was read
            if let Some(record) = self.backend.get(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Remove a record; absent ids are a no-op
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let removed = self.backend.delete(id)?;
        self.index_write()?.remove(id);
        if removed {
            self.metrics.increment_deleted();
            Logger::trace("RECORD_DELETED", &[("id", id)]);
        }
        Ok(())
    }

    /// Remove every record
    pub fn clear_all(&self) -> StoreResult<()> {
        self.backend.clear()?;
        self.index_write()?.clear();
        Logger::info("STORE_CLEARED", &[]);
        Ok(())
    }

    pub fn count(&self) -> StoreResult<usize> {
        Ok(self.index_read()?.len())
    }

    pub fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.index_read()?.contains(id))
    }

    /// Most recently updated records, newest first
    pub fn recently_updated(&self, limit: usize) -> StoreResult<Vec<StoredRecord>> {
        let ids = self.index_read()?.recently_updated(limit);
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.backend.get(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Creation time of the oldest and newest records
    pub fn created_bounds(&self) -> StoreResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let index = self.index_read()?;
        Ok((index.oldest_created(), index.newest_created()))
    }

    /// Write a record as-is, keeping its id and timestamps
    pub fn insert_record(&self, record: &StoredRecord) -> StoreResult<()> {
        record.validate()?;
        self.backend.put(record)?;
        self.index_write()?.insert(record);
        Ok(())
    }

    /// Snapshot of the whole corpus
    pub fn export_snapshot(&self) -> StoreResult<BackupSnapshot> {
        let records = self.backend.list()?;
        Ok(BackupSnapshot::new(records, self.clock.now()))
    }

    /// Snapshot of the whole corpus as a JSON blob
    pub fn export_json(&self) -> StoreResult<String> {
        self.export_snapshot()?.to_json()
    }

    /// Import a JSON snapshot blob
    ///
    /// Fails with `Parse` when the envelope is malformed. Entries that fail
    /// validation are listed in the report and do not stop the import.
    pub fn import_json(&self, blob: &str, options: RestoreOptions) -> StoreResult<RestoreReport> {
        let parsed = ParsedSnapshot::parse(blob)?;
        self.import_snapshot(parsed, options)
    }

    /// Import already-parsed snapshot entries
    pub fn import_snapshot(
        &self,
        snapshot: ParsedSnapshot,
        options: RestoreOptions,
    ) -> StoreResult<RestoreReport> {
        if options.clear_existing {
            self.clear_all()?;
        }

        let mut report = RestoreReport::default();
        for entry in snapshot.entries {
            let record = match entry {
                Ok(record) => record,
                Err(message) => {
                    Logger::warn("RESTORE_RECORD_INVALID", &[("reason", message.as_str())]);
                    report.errors.push(message);
                    continue;
                }
            };

            if options.skip_duplicates && !options.clear_existing && self.contains(&record.id)? {
                report.skipped += 1;
                continue;
            }

            self.insert_record(&record)?;
            report.imported += 1;
        }

        Ok(report)
    }

    fn index_read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, RecordIndex>> {
        self.index.read().map_err(|_| StoreError::poisoned())
    }

    fn index_write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, RecordIndex>> {
        self.index.write().map_err(|_| StoreError::poisoned())
    }
}
