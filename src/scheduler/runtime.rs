//! Tokio-backed scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{ScheduleHandle, Scheduler, Task};
use crate::observability::Logger;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns one tokio task per schedule
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime of the calling context, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> ScheduleHandle {
        let interval = interval.max(MIN_INTERVAL);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let join = self.handle.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            // A slow body pushes later ticks back instead of bursting.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }

                let body = Arc::clone(&task);
                // Abort only lands at this await, never inside a running body.
                if let Err(err) = tokio::task::spawn_blocking(move || body()).await {
                    Logger::error("SCHEDULED_TICK_PANICKED", &[("reason", err.to_string().as_str())]);
                }
            }
        });

        ScheduleHandle::new(cancelled, Some(Box::new(move || join.abort())))
    }
}
