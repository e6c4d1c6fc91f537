//! # Query Layer
//!
//! Read-only views over the record store:
//!
//! - `get_paginated`: newest first by `created_at`, optionally limited to a
//!   creation-time range
//! - `search`: case-insensitive substring filters on top-level payload
//!   fields, AND-combined, plus an inclusive range on a date-like payload
//!   field
//!
//! Both read the whole corpus per call.

mod search;

pub use search::{parse_date, DateFilter, SearchCriteria};

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::store::{DateRange, RecordStore, StoreError, StoredRecord};

/// Query errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidArgument(_) => "MDB_QUERY_INVALID_ARGUMENT",
            QueryError::InvalidDate(_) => "MDB_QUERY_INVALID_DATE",
            QueryError::Store(err) => err.code(),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

/// One page of records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub records: Vec<StoredRecord>,
    pub total_count: usize,
    pub total_pages: usize,
    /// 1-based
    pub current_page: usize,
}

/// Paginated and filtered reads
#[derive(Debug, Clone)]
pub struct RecordQuery {
    store: Arc<RecordStore>,
}

impl RecordQuery {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Page `page` (1-based) of `page_size` records, newest first
    pub fn get_paginated(
        &self,
        page: usize,
        page_size: usize,
        range: Option<&DateRange>,
    ) -> QueryResult<Page> {
        if page == 0 {
            return Err(QueryError::InvalidArgument("page must be >= 1".into()));
        }
        if page_size == 0 {
            return Err(QueryError::InvalidArgument("page_size must be >= 1".into()));
        }

        let mut records = self.store.get_all(range)?;
        newest_first(&mut records);

        let total_count = records.len();
        let total_pages = total_count.div_ceil(page_size);
        let start = (page - 1).saturating_mul(page_size);
        let records = records.into_iter().skip(start).take(page_size).collect();

        Ok(Page {
            records,
            total_count,
            total_pages,
            current_page: page,
        })
    }

    /// Records matching every criterion, newest first
    pub fn search(&self, criteria: &SearchCriteria) -> QueryResult<Vec<StoredRecord>> {
        let mut records: Vec<StoredRecord> = self
            .store
            .get_all(None)?
            .into_iter()
            .filter(|record| criteria.matches(&record.payload))
            .collect();
        newest_first(&mut records);
        Ok(records)
    }
}

fn newest_first(records: &mut [StoredRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
