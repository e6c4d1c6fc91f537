//! Versioned corpus snapshot
//!
//! Shared by scheduled backups and manual export/import:
//!
//! ```text
//! {
//!   "version": "1.0",
//!   "exportDate": "<ISO-8601>",
//!   "count": <n>,
//!   "data": [ { "id", "createdAt", "updatedAt", "data" }, ... ]
//! }
//! ```
//!
//! Unknown fields are ignored at both levels. Parsing is split in two:
//! the envelope must be well-formed (an object with a `data` array) or the
//! whole blob is rejected; each entry is then validated on its own so that
//! one bad record never blocks the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::record::StoredRecord;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: &str = "1.0";

/// A point-in-time copy of the whole corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub count: usize,
    pub data: Vec<StoredRecord>,
}

impl BackupSnapshot {
    pub fn new(records: Vec<StoredRecord>, export_date: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            export_date,
            count: records.len(),
            data: records,
        }
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A snapshot whose envelope parsed; entries are validated individually
#[derive(Debug, Clone)]
pub struct ParsedSnapshot {
    pub version: Option<String>,
    pub export_date: Option<DateTime<Utc>>,
    pub entries: Vec<Result<StoredRecord, String>>,
}

impl ParsedSnapshot {
    /// Parse a blob. Fails only when the envelope itself is malformed.
    pub fn parse(blob: &str) -> StoreResult<Self> {
        let value: Value = serde_json::from_str(blob)
            .map_err(|e| StoreError::Parse(format!("not valid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| StoreError::Parse("snapshot is not an object".into()))?;

        let data = match object.get("data") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(StoreError::Parse("`data` is not an array".into())),
            None => return Err(StoreError::Parse("missing `data` field".into())),
        };

        let version = object
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string);
        let export_date = object
            .get("exportDate")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        let entries = data
            .iter()
            .enumerate()
            .map(|(position, item)| parse_entry(position, item))
            .collect();

        Ok(Self {
            version,
            export_date,
            entries,
        })
    }

    pub fn from_snapshot(snapshot: BackupSnapshot) -> Self {
        Self {
            version: Some(snapshot.version),
            export_date: Some(snapshot.export_date),
            entries: snapshot.data.into_iter().map(Ok).collect(),
        }
    }
}

fn parse_entry(position: usize, item: &Value) -> Result<StoredRecord, String> {
    let label = item
        .get("id")
        .and_then(Value::as_str)
        .map(|id| format!("record {} ({})", position, id))
        .unwrap_or_else(|| format!("record {}", position));

    let record: StoredRecord =
        serde_json::from_value(item.clone()).map_err(|e| format!("{}: {}", label, e))?;
    record.validate().map_err(|e| format!("{}: {}", label, e))?;
    Ok(record)
}

/// Merge behavior for restore and import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Empty the store before importing
    pub clear_existing: bool,
    /// Leave records whose id already exists untouched
    pub skip_duplicates: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            clear_existing: false,
            skip_duplicates: true,
        }
    }
}

/// Outcome of a restore or import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub imported: usize,
    pub skipped: usize,
    /// One message per entry that failed validation
    pub errors: Vec<String>,
}
