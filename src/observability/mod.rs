//! Observability for manifestdb
//!
//! - Structured JSON-line logging
//! - Monotonic counters
//! - Begin/complete scopes around cleanup, backup and restore passes
//!
//! Observability never changes storage behavior and never fails an
//! operation.
//!
//! ```ignore
//! use manifestdb::observability::{Logger, ObservationScope};
//!
//! Logger::info("RECORD_SAVED", &[("id", id.as_str())]);
//!
//! let scope = ObservationScope::new("BACKUP");
//! // ... do work ...
//! scope.complete();
//! ```

mod logger;
mod metrics;
mod scope;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, StorageMetrics};
pub use scope::ObservationScope;
