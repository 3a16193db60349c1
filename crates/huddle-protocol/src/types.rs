/// Shared model types and policy constants.
use std::time::Duration;

// ── Constants ────────────────────────────────────────────────────────────

/// Maximum age of a normal chat message before eviction.
pub const MESSAGE_TTL: Duration = Duration::from_secs(60);

/// How often the store sweeps for expired messages.
pub const TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Inactivity window before the session terminates.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Remaining-time band in which inactivity warnings fire.
pub const SESSION_WARNING_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// How often the watchdog evaluates the session.
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Display name used when the transport cannot resolve one.
pub const FALLBACK_IDENTITY: &str = "unknown-device";

/// Sender recorded on system messages.
pub const SYSTEM_SENDER: &str = "System";

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time before epoch")
        .as_millis() as u64
}

// ── ChatMessage ──────────────────────────────────────────────────────────

/// Message class; system messages are exempt from TTL eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Normal,
    System,
}

/// Where a message entered this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    Local,
    Remote,
}

/// One chat or system message. Immutable once stored.
///
/// `id` is assigned by the store (monotonic, stable across evictions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: u64,
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
    pub origin: MessageOrigin,
    /// Unix ms at creation.
    pub sent_at: u64,
}

impl ChatMessage {
    /// Create a normal chat message.
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        origin: MessageOrigin,
    ) -> Self {
        Self {
            id: 0,
            sender: sender.into(),
            content: content.into(),
            kind: MessageKind::Normal,
            origin,
            sent_at: now_ms(),
        }
    }

    /// Create a system notification message (join/leave/timeout).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: 0,
            sender: SYSTEM_SENDER.to_string(),
            content: content.into(),
            kind: MessageKind::System,
            origin: MessageOrigin::Local,
            sent_at: now_ms(),
        }
    }

    /// Whether this message has outlived `ttl` as of `now` (Unix ms).
    ///
    /// Strictly greater than the TTL; system messages never expire.
    pub fn is_expired_at(&self, now: u64, ttl: Duration) -> bool {
        self.kind == MessageKind::Normal && now.saturating_sub(self.sent_at) > ttl.as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_message_expires_strictly_after_ttl() {
        let mut msg = ChatMessage::new("alice", "hi", MessageOrigin::Local);
        msg.sent_at = 1_000;
        let ttl = Duration::from_millis(500);

        assert!(!msg.is_expired_at(1_000, ttl));
        assert!(!msg.is_expired_at(1_500, ttl)); // exactly at TTL, not yet
        assert!(msg.is_expired_at(1_501, ttl));
    }

    #[test]
    fn system_message_never_expires() {
        let mut msg = ChatMessage::system("alice joined");
        msg.sent_at = 0;
        assert!(!msg.is_expired_at(u64::MAX, Duration::from_millis(1)));
    }

    #[test]
    fn system_message_fields() {
        let msg = ChatMessage::system("session ended");
        assert_eq!(msg.sender, SYSTEM_SENDER);
        assert_eq!(msg.kind, MessageKind::System);
        assert_eq!(msg.origin, MessageOrigin::Local);
    }
}
