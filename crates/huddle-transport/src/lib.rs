//! Huddle transport layer.
//!
//! Abstracts "an already-connected duplex byte stream" behind a stable API
//! so the protocol engine never touches a concrete socket type. A transport
//! can bind an inbound listener, open outbound streams by target string, and
//! resolve the local device's display identity.
//!
//! Two adapters ship with the crate: [`TcpTransport`] for real sockets and
//! [`MemoryNet`]/[`MemoryTransport`] for in-process wiring in tests.

mod error;
mod memory;
mod tcp;

pub use error::HuddleTransportError;
pub use memory::{MemoryNet, MemoryTransport};
pub use tcp::TcpTransport;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream the engine can own exclusively.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// Boxed stream handed across the transport boundary.
pub type BoxStream = Box<dyn Stream>;

/// An accepted inbound connection.
///
/// `identity` is the remote's display name, falling back to its transport
/// address when no name is available.
pub struct Inbound {
    pub stream: BoxStream,
    pub identity: String,
}

/// An established outbound connection.
///
/// `identity` names the remote endpoint we connected to.
pub struct Outbound {
    pub stream: BoxStream,
    pub identity: String,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Listener for inbound connections bound to a well-known service target.
#[async_trait]
pub trait StreamListener: Send {
    /// Block until the next inbound connection arrives.
    async fn accept(&mut self) -> Result<Inbound, HuddleTransportError>;

    /// Target string a remote would use to reach this listener, if known.
    fn local_target(&self) -> Option<String> {
        None
    }
}

/// Factory for inbound listeners and outbound connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Bind the inbound listener for this endpoint.
    async fn bind(&self) -> Result<Box<dyn StreamListener>, HuddleTransportError>;

    /// Open an outbound stream to `target`.
    async fn connect(&self, target: &str) -> Result<Outbound, HuddleTransportError>;

    /// Display identity of the local device, if resolvable.
    fn local_identity(&self) -> Option<String>;
}
