//! Observer lists for server and media notifications
//!
//! A [`Signal`] delivers every emission synchronously, on the emitting thread,
//! to its handlers in the order they were connected. The handler list is
//! snapshotted before delivery, so a handler may connect or disconnect
//! handlers (including itself) while it runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies a connected handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Synchronous, ordered observer list
pub struct Signal<T> {
    handlers: Mutex<Vec<(HandlerId, Handler<T>)>>,
    next_id: AtomicU64,
}

impl<T> Signal<T> {
    /// Create a signal with no handlers
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler, returning its id
    pub fn connect<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not connected.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        handlers.len() != before
    }

    /// Deliver `value` to every handler in registration order
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in snapshot {
            handler(value);
        }
    }

    /// Number of connected handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let signal = Signal::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            signal.connect(move |v| seen.lock().push(format!("{tag}{v}")));
        }

        signal.emit(&1);
        signal.emit(&2);

        assert_eq!(*seen.lock(), vec!["a1", "b1", "c1", "a2", "b2", "c2"]);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<()>::new();
        let hits = Arc::new(AtomicU64::new(0));

        let h = Arc::clone(&hits);
        let id = signal.connect(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        signal.emit(&());
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_handler_may_disconnect_itself() {
        let signal = Arc::new(Signal::<()>::new());
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicU64::new(0));

        let (sig, s, h) = (Arc::downgrade(&signal), Arc::clone(&slot), Arc::clone(&hits));
        let id = signal.connect(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let (Some(sig), Some(id)) = (sig.upgrade(), *s.lock()) {
                sig.disconnect(id);
            }
        });
        *slot.lock() = Some(id);

        signal.emit(&());
        signal.emit(&());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
