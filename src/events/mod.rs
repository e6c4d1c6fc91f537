//! # Event Bus
//!
//! Synchronous fan-out of storage lifecycle events.
//!
//! - Listeners run on the emitting thread, in registration order
//! - A listener that fails (returns `Err` or panics) is logged and counted;
//!   the remaining listeners still run and the emitter never sees it
//! - Only listeners registered at the moment of emission are called
//! - Best-effort: no queueing, no retry

mod event;

pub use event::{EventKind, StorageEvent};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::observability::{Logger, StorageMetrics};

/// A listener's own failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        ListenerError(message)
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        ListenerError(message.to_string())
    }
}

/// Callback invoked for every event
pub type Listener = Arc<dyn Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by `add_listener`, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of one `notify`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Fan-out hub shared by the monitor, backup manager and storage manager
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    metrics: Option<Arc<StorageMetrics>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count listener failures in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<StorageMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StorageEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((id, Arc::new(listener))),
            Err(poisoned) => poisoned.into_inner().push((id, Arc::new(listener))),
        }
        id
    }

    /// `false` if `id` was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = match self.listeners.write() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Deliver `event` to every registered listener
    pub fn notify(&self, event: StorageEvent) -> Delivery {
        // Listeners may add or remove listeners; call them without the lock.
        let listeners: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| Arc::clone(l)).collect(),
        };

        let mut delivery = Delivery::default();
        for listener in listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.0),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            match failure {
                None => delivery.delivered += 1,
                Some(reason) => {
                    delivery.failed += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.increment_listener_failures();
                    }
                    Logger::warn(
                        "LISTENER_FAILED",
                        &[("kind", event.kind().as_str()), ("reason", reason.as_str())],
                    );
                }
            }
        }
        delivery
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<EventKind>>>, impl Fn(&StorageEvent) -> Result<(), ListenerError>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |event: &StorageEvent| -> Result<(), ListenerError> {
            sink.lock().unwrap().push(event.kind());
            Ok(())
        };
        (seen, listener)
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            bus.add_listener(move |_| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }

        let delivery = bus.notify(StorageEvent::Started);
        assert_eq!(delivery.delivered, 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_failing_listener_isolated() {
        let metrics = Arc::new(StorageMetrics::new());
        let bus = EventBus::new().with_metrics(Arc::clone(&metrics));
        bus.add_listener(|_| Err("display refresh failed".into()));
        let (seen, listener) = recorder();
        bus.add_listener(listener);

        let delivery = bus.notify(StorageEvent::Stopped);

        assert_eq!(delivery, Delivery { delivered: 1, failed: 1 });
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Stopped]);
        assert_eq!(metrics.snapshot().listener_failures, 1);
    }

    #[test]
    fn test_panicking_listener_isolated() {
        let bus = EventBus::new();
        bus.add_listener(|_| panic!("listener bug"));
        let (seen, listener) = recorder();
        bus.add_listener(listener);

        for _ in 0..3 {
            bus.notify(StorageEvent::BackupStarted);
        }
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::new();
        let (seen, listener) = recorder();
        let id = bus.add_listener(listener);

        bus.notify(StorageEvent::Started);
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        bus.notify(StorageEvent::Stopped);

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Started]);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_register_during_notify() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.add_listener(move |_| {
            inner.add_listener(|_| Ok(()));
            Ok(())
        });

        let delivery = bus.notify(StorageEvent::Started);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(bus.listener_count(), 2);
    }
}
