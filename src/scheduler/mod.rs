//! # Repeating Schedules
//!
//! The capacity monitor and the backup manager run their cycles through a
//! `Scheduler` instead of owning timers, so the cycles can be driven by
//! fake time in tests.
//!
//! - `TokioScheduler` runs each tick body on tokio's blocking pool
//! - `ManualScheduler` runs due ticks only when `advance` is called
//!
//! Cancelling a schedule prevents future ticks; a tick body that is
//! already running finishes.

mod manual;
mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Body of a repeating schedule
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Arms repeating tasks
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Run `task` every `interval`, first after one full interval
    fn schedule_repeating(&self, interval: Duration, task: Task) -> ScheduleHandle;
}

/// Owns one armed schedule; dropping it cancels the schedule
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ScheduleHandle {
    pub(crate) fn new(
        cancelled: Arc<AtomicBool>,
        on_cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
    ) -> Self {
        Self {
            cancelled,
            on_cancel,
        }
    }

    /// Stop future ticks
    pub fn cancel(mut self) {
        self.disarm();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn disarm(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
