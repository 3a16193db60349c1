/// In-memory message store with TTL eviction.
///
/// Messages are append-only with store-assigned monotonic ids, so eviction
/// needs no index-shifting bookkeeping. A periodic sweeper evicts normal
/// messages older than the TTL and notifies the listener with ONE batch
/// `Reset` per evicting sweep: observers resynchronize from the snapshot
/// instead of applying incremental deletions.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::EventSink;
use crate::types::{now_ms, ChatMessage, MESSAGE_TTL, TTL_SWEEP_INTERVAL};

// ── Events ───────────────────────────────────────────────────────────────

/// Store changes delivered to the attached listener.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A message was appended at `index`.
    Added { message: ChatMessage, index: usize },
    /// The sequence changed wholesale (TTL sweep or clear); resynchronize
    /// from the snapshot.
    Reset { snapshot: Vec<ChatMessage> },
}

// ── Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum age of a normal message.
    pub ttl: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: MESSAGE_TTL,
            sweep_interval: TTL_SWEEP_INTERVAL,
        }
    }
}

// ── MessageStore ─────────────────────────────────────────────────────────

/// TTL-bounded ordered message sequence. Cheap to clone.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    messages: Mutex<Vec<ChatMessage>>,
    next_id: AtomicU64,
    sink: EventSink<StoreEvent>,
    sweeper: Mutex<Option<CancellationToken>>,
    config: StoreConfig,
}

impl MessageStore {
    /// Create a store and the receiver for its initial listener.
    pub fn new(config: StoreConfig) -> (Self, mpsc::UnboundedReceiver<StoreEvent>) {
        let (sink, rx) = EventSink::new();
        (
            Self {
                inner: Arc::new(StoreInner {
                    messages: Mutex::new(Vec::new()),
                    next_id: AtomicU64::new(0),
                    sink,
                    sweeper: Mutex::new(None),
                    config,
                }),
            },
            rx,
        )
    }

    /// Swap the listener; in-flight sweeps deliver to the new one.
    pub fn set_sink(&self, tx: mpsc::UnboundedSender<StoreEvent>) {
        self.inner.sink.replace(tx);
    }

    /// Append a message, assigning its id. Returns the id.
    pub fn add(&self, mut message: ChatMessage) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        message.id = id;
        let mut messages = self.inner.messages.lock().expect("store lock poisoned");
        messages.push(message.clone());
        let index = messages.len() - 1;
        // Emit under the lock so indices stay coherent across concurrent adds.
        self.inner.sink.emit(StoreEvent::Added { message, index });
        id
    }

    /// Defensive copy of the current sequence.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner
            .messages
            .lock()
            .expect("store lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .messages
            .lock()
            .expect("store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every message and notify with an empty snapshot.
    pub fn clear(&self) {
        let mut messages = self.inner.messages.lock().expect("store lock poisoned");
        messages.clear();
        self.inner.sink.emit(StoreEvent::Reset {
            snapshot: Vec::new(),
        });
    }

    /// Evict normal messages older than the TTL as of `now` (Unix ms).
    ///
    /// Emits one `Reset` if anything was removed. Returns the eviction
    /// count. This is the sweeper's tick body, public so tests can drive it
    /// with an explicit clock.
    pub fn sweep_at(&self, now: u64) -> usize {
        let ttl = self.inner.config.ttl;
        let mut messages = self.inner.messages.lock().expect("store lock poisoned");
        let before = messages.len();
        messages.retain(|m| !m.is_expired_at(now, ttl));
        let removed = before - messages.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = messages.len(), "expired messages evicted");
            self.inner.sink.emit(StoreEvent::Reset {
                snapshot: messages.clone(),
            });
        }
        removed
    }

    /// Start the periodic TTL sweeper. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) {
        let mut slot = self.inner.sweeper.lock().expect("store lock poisoned");
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.inner.config.sweep_interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep_at(now_ms());
                    }
                }
            }
        });
    }

    /// Stop the sweeper. Idempotent.
    pub fn shutdown(&self) {
        if let Some(token) = self
            .inner
            .sweeper
            .lock()
            .expect("store lock poisoned")
            .take()
        {
            token.cancel();
        }
    }
}
