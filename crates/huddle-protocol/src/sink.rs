/// Swappable event sink.
///
/// Every producer task holds a clone of the same cell, and the sender is
/// read at delivery time, so a swap is visible to all in-flight producers
/// before their next emitted event, with no event routed to a sink cached
/// at task-start time.
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

pub struct EventSink<E> {
    tx: Arc<RwLock<mpsc::UnboundedSender<E>>>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<E> EventSink<E> {
    /// Create a sink together with the receiver for its initial listener.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Arc::new(RwLock::new(tx)),
            },
            rx,
        )
    }

    /// Swap in a new listener. Events already delivered to the previous
    /// receiver stay there; everything after the swap goes to the new one.
    pub fn replace(&self, tx: mpsc::UnboundedSender<E>) {
        *self.tx.write().expect("sink lock poisoned") = tx;
    }

    /// Deliver an event to whatever listener is currently attached.
    ///
    /// Never blocks; silently dropped if the receiver is gone.
    pub fn emit(&self, event: E) {
        let _ = self.tx.read().expect("sink lock poisoned").send(event);
    }
}
