/// Wire protocol frames.
///
/// Each frame is one write call's worth of UTF-8 text, received as one
/// read's worth of bytes. There is no delimiter or length field: the
/// transport's read boundaries ARE the framing. Large or back-to-back
/// writes can merge on a plain byte stream; adding a length prefix would
/// break wire compatibility with deployed peers, so the framing stays.
use std::time::Duration;

// ── Protocol constants ───────────────────────────────────────────────────

pub const AUTH_PREFIX: &str = "AUTH:";
pub const AUTH_OK: &str = "AUTH_OK";
pub const AUTH_FAIL: &str = "AUTH_FAIL";
pub const CHAT_PREFIX: &str = "MSG:";
pub const JOIN_PREFIX: &str = "JOIN:";
pub const LEAVE_PREFIX: &str = "LEAVE:";
pub const SESSION_END: &str = "SESSION_END";

/// Read buffer size for a single frame.
pub const MAX_FRAME_BYTES: usize = 4096;

/// Pause before closing a rejected stream; throttles reconnect loops.
pub const AUTH_REJECT_DELAY: Duration = Duration::from_millis(500);

// ── Frame ────────────────────────────────────────────────────────────────

/// One self-contained protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame on a new stream: offers the secret digest.
    Auth { digest: String },
    /// Host reply: admitted.
    AuthOk,
    /// Host reply: rejected.
    AuthFail,
    /// Chat payload; content may itself contain `:`.
    Chat { sender: String, content: String },
    /// Host announces a newly admitted peer to the others.
    Join { identity: String },
    /// A peer is departing.
    Leave { identity: String },
    /// Host is tearing down the whole session.
    SessionEnd,
}

impl Frame {
    /// Wire text for this frame.
    pub fn encode(&self) -> String {
        match self {
            Frame::Auth { digest } => format!("{AUTH_PREFIX}{digest}"),
            Frame::AuthOk => AUTH_OK.to_string(),
            Frame::AuthFail => AUTH_FAIL.to_string(),
            Frame::Chat { sender, content } => format!("{CHAT_PREFIX}{sender}:{content}"),
            Frame::Join { identity } => format!("{JOIN_PREFIX}{identity}"),
            Frame::Leave { identity } => format!("{LEAVE_PREFIX}{identity}"),
            Frame::SessionEnd => SESSION_END.to_string(),
        }
    }

    /// Parse one received frame; `None` for anything unrecognized.
    ///
    /// Chat splits on the FIRST `:` after the sender, so content keeps any
    /// colons of its own. An empty sender is rejected.
    pub fn parse(raw: &str) -> Option<Frame> {
        if let Some(payload) = raw.strip_prefix(CHAT_PREFIX) {
            let (sender, content) = payload.split_once(':')?;
            if sender.is_empty() {
                return None;
            }
            return Some(Frame::Chat {
                sender: sender.to_string(),
                content: content.to_string(),
            });
        }
        if let Some(digest) = raw.strip_prefix(AUTH_PREFIX) {
            return Some(Frame::Auth {
                digest: digest.to_string(),
            });
        }
        if let Some(identity) = raw.strip_prefix(JOIN_PREFIX) {
            return Some(Frame::Join {
                identity: identity.to_string(),
            });
        }
        if let Some(identity) = raw.strip_prefix(LEAVE_PREFIX) {
            return Some(Frame::Leave {
                identity: identity.to_string(),
            });
        }
        match raw {
            AUTH_OK => Some(Frame::AuthOk),
            AUTH_FAIL => Some(Frame::AuthFail),
            SESSION_END => Some(Frame::SessionEnd),
            _ => None,
        }
    }
}
