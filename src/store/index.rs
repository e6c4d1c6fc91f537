//! Creation-time and update-time orderings over record ids

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use chrono::{DateTime, Utc};

use super::record::{DateRange, StoredRecord};

type Key = (DateTime<Utc>, String);

/// Secondary orderings kept alongside the backend
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    by_created: BTreeSet<Key>,
    by_updated: BTreeSet<Key>,
    stamps: HashMap<String, (DateTime<Utc>, DateTime<Utc>)>,
}

impl RecordIndex {
    pub(crate) fn rebuild(records: &[StoredRecord]) -> Self {
        let mut index = Self::default();
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Insert or replace the entry for `record.id`
    pub(crate) fn insert(&mut self, record: &StoredRecord) {
        self.remove(&record.id);
        self.by_created
            .insert((record.created_at, record.id.clone()));
        self.by_updated
            .insert((record.updated_at, record.id.clone()));
        self.stamps
            .insert(record.id.clone(), (record.created_at, record.updated_at));
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        match self.stamps.remove(id) {
            Some((created, updated)) => {
                self.by_created.remove(&(created, id.to_string()));
                self.by_updated.remove(&(updated, id.to_string()));
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.by_created.clear();
        self.by_updated.clear();
        self.stamps.clear();
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.stamps.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Ids created inside `range`, oldest first
    pub(crate) fn created_in(&self, range: &DateRange) -> Vec<String> {
        let lower = match range.from {
            Some(from) => Bound::Included((from, String::new())),
            None => Bound::Unbounded,
        };
        self.by_created
            .range((lower, Bound::Unbounded))
            .take_while(|(created, _)| range.to.map_or(true, |to| *created <= to))
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Ids by update time, newest first
    pub(crate) fn recently_updated(&self, limit: usize) -> Vec<String> {
        self.by_updated
            .iter()
            .rev()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect()
    }

    pub(crate) fn oldest_created(&self) -> Option<DateTime<Utc>> {
        self.by_created.iter().next().map(|(t, _)| *t)
    }

    pub(crate) fn newest_created(&self) -> Option<DateTime<Utc>> {
        self.by_created.iter().next_back().map(|(t, _)| *t)
    }
}
