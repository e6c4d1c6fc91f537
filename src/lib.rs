//! manifestdb - local record store for scanned flight manifests
//!
//! Records are opaque JSON payloads with an id and two timestamps. The store
//! is kept under a storage quota by evicting the oldest records, and is
//! backed up on a timer into versioned snapshots that can be restored.
//!
//! - `store`: records, backends, snapshot format
//! - `usage`: quota and size accounting
//! - `capacity`: threshold-driven eviction loop
//! - `backup`: timed snapshots, pruning, restore
//! - `events`: lifecycle notifications
//! - `query`: pagination and search
//! - `manager`: the facade tying them together

pub mod backup;
pub mod capacity;
pub mod cli;
pub mod clock;
pub mod config;
pub mod events;
pub mod manager;
pub mod observability;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod usage;

pub use manager::{ManagerError, ManagerResult, StorageManager, StorageStats};
