//! Handler lists for element and pad notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a connected handler; pass it back to `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(u64);

impl SignalHandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Ordered list of handlers of one signal.
///
/// Emitters take a snapshot with [`Signal::handlers`] and call the handlers
/// after the list lock is released, so a handler may connect or disconnect
/// other handlers.
pub(crate) struct Signal<F: ?Sized> {
    handlers: Mutex<Vec<(SignalHandlerId, Arc<F>)>>,
}

impl<F: ?Sized> Signal<F> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn connect(&self, handler: Arc<F>) -> SignalHandlerId {
        let id = SignalHandlerId::next();
        self.handlers.lock().unwrap().push((id, handler));
        id
    }

    pub(crate) fn disconnect(&self, id: SignalHandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    pub(crate) fn handlers(&self) -> Vec<Arc<F>> {
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Handler = dyn Fn(usize) + Send + Sync;

    #[test]
    fn test_connect_emit_disconnect() {
        let signal: Signal<Handler> = Signal::new();
        let total = Arc::new(AtomicUsize::new(0));

        let t = total.clone();
        let id = signal.connect(Arc::new(move |n| {
            t.fetch_add(n, Ordering::SeqCst);
        }));
        for handler in signal.handlers() {
            handler(3);
        }
        assert_eq!(total.load(Ordering::SeqCst), 3);

        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        assert!(signal.handlers().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let signal: Signal<Handler> = Signal::new();
        let a = signal.connect(Arc::new(|_| {}));
        let b = signal.connect(Arc::new(|_| {}));
        assert_ne!(a, b);
    }
}
