//! Stored record types
//!
//! Wire shape (shared by the file backend and backup snapshots):
//!
//! ```text
//! { "id": "...", "createdAt": "<ISO-8601>", "updatedAt": "<ISO-8601>", "data": <payload> }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{StoreError, StoreResult};

/// Longest accepted record id
pub const MAX_ID_LEN: usize = 128;

/// One persisted manifest entry
///
/// `updated_at >= created_at` holds for every record the store hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    /// Generated at creation, never changes
    pub id: String,

    /// Caller-defined payload; never inspected by the store
    #[serde(rename = "data", default)]
    pub payload: Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Build a record with both timestamps set to `now`
    pub fn new(id: impl Into<String>, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Structural checks applied to records coming from outside the store
    pub fn validate(&self) -> StoreResult<()> {
        validate_id(&self.id)?;
        if self.updated_at < self.created_at {
            return Err(StoreError::Validation(format!(
                "{}: updatedAt precedes createdAt",
                self.id
            )));
        }
        Ok(())
    }
}

/// Ids double as file names in the file backend, so only a conservative
/// character set is accepted.
pub fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidId("empty id".into()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::InvalidId(format!("id longer than {} bytes", MAX_ID_LEN)));
    }
    if id.starts_with('.')
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Inclusive creation-time window; an open side is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::new(Some(from), Some(to))
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| t >= from) && self.to.map_or(true, |to| t <= to)
    }
}
