/// Connection layer: per-peer connections, the accept loop, and the hub
/// that owns them.
mod acceptor;
mod hub;
mod peer;

pub use hub::{AuthHooks, ConnectionHub};
pub use peer::PeerConnection;

/// Events the connection layer delivers to the attached sink.
///
/// `Frame` carries the raw received text; the driver parses it with
/// [`crate::frame::Frame::parse`].
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A peer finished authentication (host side) or we reached a host
    /// (client side).
    Connected { identity: String },
    /// A peer's stream failed or reached EOF.
    Disconnected { identity: String },
    /// An outbound connection could not be established or was rejected.
    ConnectionFailed { reason: String },
    /// One read's worth of bytes arrived from some admitted peer.
    Frame { text: String },
}
