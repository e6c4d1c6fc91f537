//! # Record Backend Trait

use super::errors::StoreResult;
use super::record::StoredRecord;

/// Key-value persistence under the record store
///
/// Every call is its own transaction; there is no multi-record atomicity.
pub trait RecordBackend: Send + Sync + std::fmt::Debug {
    /// Read one record
    fn get(&self, id: &str) -> StoreResult<Option<StoredRecord>>;

    /// Insert or replace a record
    fn put(&self, record: &StoredRecord) -> StoreResult<()>;

    /// Remove a record; `false` if it was not present
    fn delete(&self, id: &str) -> StoreResult<bool>;

    /// Every record, in backend-native order
    fn list(&self) -> StoreResult<Vec<StoredRecord>>;

    /// Remove every record
    fn clear(&self) -> StoreResult<()>;
}
