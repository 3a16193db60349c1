/// TCP adapter.
///
/// Inbound identities are the remote socket address; outbound identities are
/// the target string the caller dialed. A display name for the local device
/// can be configured; without one the engine falls back to a placeholder.
use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use crate::{HuddleTransportError, Inbound, Outbound, StreamListener, Transport};

/// Transport over plain TCP sockets.
pub struct TcpTransport {
    bind_addr: String,
    identity: Option<String>,
}

impl TcpTransport {
    /// Create a transport that will listen on `bind_addr` (e.g. `"0.0.0.0:7420"`).
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            identity: None,
        }
    }

    /// Set the display name announced for the local device.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn bind(&self) -> Result<Box<dyn StreamListener>, HuddleTransportError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(HuddleTransportError::Bind)?;
        tracing::debug!(addr = %self.bind_addr, "tcp listener bound");
        Ok(Box::new(TcpStreamListener { listener }))
    }

    async fn connect(&self, target: &str) -> Result<Outbound, HuddleTransportError> {
        let stream =
            TcpStream::connect(target)
                .await
                .map_err(|source| HuddleTransportError::Connect {
                    target: target.to_string(),
                    source,
                })?;
        let _ = stream.set_nodelay(true);
        Ok(Outbound {
            stream: Box::new(stream),
            identity: target.to_string(),
        })
    }

    fn local_identity(&self) -> Option<String> {
        self.identity.clone()
    }
}

struct TcpStreamListener {
    listener: TcpListener,
}

#[async_trait]
impl StreamListener for TcpStreamListener {
    async fn accept(&mut self) -> Result<Inbound, HuddleTransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(HuddleTransportError::Accept)?;
        let _ = stream.set_nodelay(true);
        Ok(Inbound {
            stream: Box::new(stream),
            identity: addr.to_string(),
        })
    }

    fn local_target(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn bind_connect_roundtrip() {
        let transport = TcpTransport::new("127.0.0.1:0").with_identity("laptop");
        let mut listener = transport.bind().await.unwrap();
        let target = listener.local_target().unwrap();

        let client = tokio::spawn(async move {
            let transport = TcpTransport::new("127.0.0.1:0");
            let mut out = transport.connect(&target).await.unwrap();
            out.stream.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            out.stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"pong");
        });

        let mut inbound = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        inbound.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        inbound.stream.write_all(b"pong").await.unwrap();

        client.await.unwrap();
        assert_eq!(transport.local_identity().as_deref(), Some("laptop"));
    }

    #[tokio::test]
    async fn connect_refused_is_transport_error() {
        let transport = TcpTransport::new("127.0.0.1:0");
        // Bind-then-drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = transport.connect(&target).await.unwrap_err();
        assert!(matches!(err, HuddleTransportError::Connect { .. }));
    }
}
