/// Session inactivity watchdog.
///
/// Tracks the last qualifying activity (chat in or out, member join) and
/// runs a periodic check: inside the warning band it emits repeatable
/// warnings with the remaining time; at zero it emits one terminal timeout
/// and stops itself, so later ticks are no-ops.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::EventSink;
use crate::types::{now_ms, SESSION_CHECK_INTERVAL, SESSION_TIMEOUT, SESSION_WARNING_THRESHOLD};

// ── Events ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Inside the warning band; fired on every check until activity or
    /// timeout.
    Warning { remaining: Duration },
    /// The session timed out. Fired exactly once; the clock has stopped.
    TimedOut,
}

// ── Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub warning_threshold: Duration,
    pub check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: SESSION_TIMEOUT,
            warning_threshold: SESSION_WARNING_THRESHOLD,
            check_interval: SESSION_CHECK_INTERVAL,
        }
    }
}

// ── SessionClock ─────────────────────────────────────────────────────────

/// Inactivity clock for the whole session. Cheap to clone; `touch` is safe
/// from any task.
#[derive(Clone)]
pub struct SessionClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    /// Unix ms of the last qualifying activity.
    last_activity: AtomicU64,
    running: AtomicBool,
    sink: EventSink<SessionEvent>,
    watchdog: Mutex<Option<CancellationToken>>,
    config: SessionConfig,
}

impl SessionClock {
    /// Create a clock and the receiver for its initial listener. The clock
    /// is idle until `start`.
    pub fn new(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sink, rx) = EventSink::new();
        (
            Self {
                inner: Arc::new(ClockInner {
                    last_activity: AtomicU64::new(now_ms()),
                    running: AtomicBool::new(false),
                    sink,
                    watchdog: Mutex::new(None),
                    config,
                }),
            },
            rx,
        )
    }

    /// Swap the listener; the running watchdog delivers to the new one.
    pub fn set_sink(&self, tx: mpsc::UnboundedSender<SessionEvent>) {
        self.inner.sink.replace(tx);
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.touch_at(now_ms());
    }

    /// Record activity at an explicit time (for testing).
    pub fn touch_at(&self, now: u64) {
        self.inner.last_activity.store(now, Ordering::SeqCst);
    }

    /// Milliseconds until timeout, zero once it is due.
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_at(now_ms())
    }

    fn remaining_at(&self, now: u64) -> u64 {
        let elapsed = now.saturating_sub(self.inner.last_activity.load(Ordering::SeqCst));
        (self.inner.config.timeout.as_millis() as u64).saturating_sub(elapsed)
    }

    pub fn is_active(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && self.remaining_ms() > 0
    }

    /// One watchdog evaluation against an explicit clock.
    ///
    /// On timeout the clock stops itself before reporting, so a second call
    /// returns `None`. Public so tests can drive the schedule directly.
    pub fn check_at(&self, now: u64) -> Option<SessionEvent> {
        if !self.inner.running.load(Ordering::SeqCst) {
            return None;
        }
        let remaining = self.remaining_at(now);
        if remaining == 0 {
            self.inner.running.store(false, Ordering::SeqCst);
            tracing::info!("session timed out after inactivity");
            Some(SessionEvent::TimedOut)
        } else if remaining <= self.inner.config.warning_threshold.as_millis() as u64 {
            Some(SessionEvent::Warning {
                remaining: Duration::from_millis(remaining),
            })
        } else {
            None
        }
    }

    /// Reset activity to now and start the watchdog. No-op if running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut slot = self.inner.watchdog.lock().expect("clock lock poisoned");
        if slot.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        self.inner.running.store(true, Ordering::SeqCst);
        self.touch();

        let clock = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(clock.inner.config.check_interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match clock.check_at(now_ms()) {
                            Some(event @ SessionEvent::TimedOut) => {
                                clock.inner.sink.emit(event);
                                break;
                            }
                            Some(event) => clock.inner.sink.emit(event),
                            None => {}
                        }
                    }
                }
            }
            // Leave the slot empty so a later start() can re-arm.
            clock
                .inner
                .watchdog
                .lock()
                .expect("clock lock poisoned")
                .take();
        });
    }

    /// Stop the watchdog. Idempotent.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(token) = self
            .inner
            .watchdog
            .lock()
            .expect("clock lock poisoned")
            .take()
        {
            token.cancel();
        }
    }
}
