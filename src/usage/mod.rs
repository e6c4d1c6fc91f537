//! Usage estimation
//!
//! Reports how much of the storage quota the corpus consumes. This is the
//! single input the capacity monitor uses to decide whether to evict.
//!
//! - A `QuotaProvider` that measures usage itself is authoritative
//! - Otherwise `used` is the sum of `SizeEstimator::estimate_size` over all
//!   records
//! - No provider, or a failing provider, means `quota = 0` and therefore
//!   `usage_percentage = 0`, which disables threshold-triggered cleanup
//!
//! Estimation has no side effects and is always safe to call.

mod errors;
mod quota;

pub use errors::{UsageError, UsageResult};
pub use quota::{DirectoryQuota, FixedQuota, QuotaEstimate, QuotaProvider};

use std::sync::Arc;

use serde::Serialize;

use crate::observability::Logger;
use crate::store::{RecordStore, StoredRecord};

/// Storage usage at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageInfo {
    /// Bytes in use
    pub used: u64,
    /// Bytes available; 0 when unknown
    pub quota: u64,
    /// Records in the store
    pub count: usize,
    /// `used / quota * 100`, clamped to `0..=100`; 0 when `quota == 0`
    pub usage_percentage: f64,
}

impl UsageInfo {
    pub fn new(used: u64, quota: u64, count: usize) -> Self {
        let usage_percentage = if quota > 0 {
            (used as f64 / quota as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            used,
            quota,
            count,
            usage_percentage,
        }
    }
}

/// Size accounting for one record
pub trait SizeEstimator: Send + Sync + std::fmt::Debug {
    fn estimate_size(&self, record: &StoredRecord) -> u64;
}

/// Length of the record's serialized JSON, payload included
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSizeEstimator;

impl SizeEstimator for JsonSizeEstimator {
    fn estimate_size(&self, record: &StoredRecord) -> u64 {
        serde_json::to_vec(record)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0)
    }
}

/// Computes `UsageInfo` for a record store
#[derive(Debug)]
pub struct UsageEstimator {
    store: Arc<RecordStore>,
    sizer: Box<dyn SizeEstimator>,
    quota: Option<Box<dyn QuotaProvider>>,
}

impl UsageEstimator {
    /// Estimator with JSON sizing and no quota provider
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            sizer: Box::new(JsonSizeEstimator),
            quota: None,
        }
    }

    pub fn with_size_estimator(mut self, sizer: impl SizeEstimator + 'static) -> Self {
        self.sizer = Box::new(sizer);
        self
    }

    pub fn with_quota_provider(mut self, quota: impl QuotaProvider + 'static) -> Self {
        self.quota = Some(Box::new(quota));
        self
    }

    /// Current usage
    pub fn get_usage_info(&self) -> UsageResult<UsageInfo> {
        let count = self.store.count()?;

        let info = match self.quota_estimate() {
            Some(QuotaEstimate {
                used_bytes: Some(used),
                quota_bytes,
            }) => UsageInfo::new(used, quota_bytes, count),
            Some(QuotaEstimate {
                used_bytes: None,
                quota_bytes,
            }) => UsageInfo::new(self.local_bytes()?, quota_bytes, count),
            None => UsageInfo::new(self.local_bytes()?, 0, count),
        };
        Ok(info)
    }

    /// Sum of estimated record sizes
    pub fn local_bytes(&self) -> UsageResult<u64> {
        let records = self.store.get_all(None)?;
        Ok(self.sum_sizes(&records))
    }

    /// Track usage across a run of deletions from `records`, the corpus as
    /// just loaded by the caller
    ///
    /// Locally estimated usage is updated by subtraction; provider-measured
    /// usage is re-queried after each removal.
    pub fn running(&self, records: &[StoredRecord]) -> UsageResult<RunningUsage<'_>> {
        let count = self.store.count()?;

        let (info, measured) = match self.quota_estimate() {
            Some(QuotaEstimate {
                used_bytes: Some(used),
                quota_bytes,
            }) => (UsageInfo::new(used, quota_bytes, count), true),
            Some(QuotaEstimate {
                used_bytes: None,
                quota_bytes,
            }) => (UsageInfo::new(self.sum_sizes(records), quota_bytes, count), false),
            None => (UsageInfo::new(self.sum_sizes(records), 0, count), false),
        };
        Ok(RunningUsage {
            estimator: self,
            info,
            measured,
        })
    }

    fn sum_sizes(&self, records: &[StoredRecord]) -> u64 {
        records.iter().map(|r| self.sizer.estimate_size(r)).sum()
    }

    /// `None` without a provider or when the provider fails
    fn quota_estimate(&self) -> Option<QuotaEstimate> {
        let provider = self.quota.as_ref()?;
        match provider.estimate() {
            Ok(estimate) => Some(estimate),
            Err(err) => {
                Logger::warn(
                    "QUOTA_QUERY_FAILED",
                    &[("code", err.code()), ("reason", err.to_string().as_str())],
                );
                None
            }
        }
    }
}

/// Usage kept current while records are removed one by one
#[derive(Debug)]
pub struct RunningUsage<'a> {
    estimator: &'a UsageEstimator,
    info: UsageInfo,
    measured: bool,
}

impl RunningUsage<'_> {
    pub fn info(&self) -> UsageInfo {
        self.info
    }

    /// Account for `record` having left the store
    pub fn removed(&mut self, record: &StoredRecord) -> UsageResult<UsageInfo> {
        self.info = if self.measured {
            self.estimator.get_usage_info()?
        } else {
            let used = self
                .info
                .used
                .saturating_sub(self.estimator.sizer.estimate_size(record));
            UsageInfo::new(used, self.info.quota, self.estimator.store.count()?)
        };
        Ok(self.info)
    }
}
