//! # In-Memory Backend

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::backend::RecordBackend;
use super::errors::{StoreError, StoreResult};
use super::record::StoredRecord;

/// Volatile backend; native order is id order
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<String, StoredRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordBackend for MemoryBackend {
    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: &StoredRecord) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        Ok(records.remove(id).is_some())
    }

    fn list(&self) -> StoreResult<Vec<StoredRecord>> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.values().cloned().collect())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        records.clear();
        Ok(())
    }
}
