//! Fake-time scheduler

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ScheduleHandle, Scheduler, Task};

struct Entry {
    interval: Duration,
    next_due: Duration,
    task: Task,
    cancelled: Arc<AtomicBool>,
}

/// Runs due ticks only when time is advanced explicitly
///
/// ```ignore
/// let scheduler = Arc::new(ManualScheduler::new());
/// monitor.start();                                  // arms a 60s schedule
/// scheduler.advance(Duration::from_secs(180));      // three ticks run here
/// ```
#[derive(Default)]
pub struct ManualScheduler {
    elapsed: Mutex<Duration>,
    entries: Mutex<Vec<Entry>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("elapsed", &self.elapsed())
            .field("active", &self.active_count())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fake time since creation
    pub fn elapsed(&self) -> Duration {
        self.elapsed.lock().map(|e| *e).unwrap_or_default()
    }

    /// Schedules that have not been cancelled
    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !e.cancelled.load(Ordering::Acquire))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Move fake time forward, running every tick that falls due, in due
    /// order. Returns the number of ticks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.elapsed() + by;
        let mut ran = 0;

        loop {
            let due = {
                let mut entries = match self.entries.lock() {
                    Ok(entries) => entries,
                    Err(_) => break,
                };
                entries.retain(|e| !e.cancelled.load(Ordering::Acquire));

                let next = entries
                    .iter_mut()
                    .filter(|e| e.next_due <= target)
                    .min_by_key(|e| e.next_due);
                match next {
                    Some(entry) => {
                        let at = entry.next_due;
                        entry.next_due += entry.interval;
                        Some((at, Arc::clone(&entry.task)))
                    }
                    None => None,
                }
            };

            let (at, task) = match due {
                Some(due) => due,
                None => break,
            };
            if let Ok(mut elapsed) = self.elapsed.lock() {
                *elapsed = at;
            }
            // Run without holding the entry lock so the body may reschedule.
            task();
            ran += 1;
        }

        if let Ok(mut elapsed) = self.elapsed.lock() {
            *elapsed = target;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> ScheduleHandle {
        let interval = interval.max(Duration::from_millis(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = Entry {
            interval,
            next_due: self.elapsed() + interval,
            task,
            cancelled: Arc::clone(&cancelled),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
        ScheduleHandle::new(cancelled, None)
    }
}
