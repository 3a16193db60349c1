/// The accept loop.
///
/// Blocks on the listener and hands every accepted stream to the hub
/// without waiting for its handshake, so a slow or hostile peer never
/// stalls admission of others. Any accept error while still running is
/// fatal to this acceptor instance; hosting must be restarted.
use tokio_util::sync::CancellationToken;

use huddle_transport::StreamListener;

use crate::conn::hub::ConnectionHub;

pub(crate) struct Acceptor {
    token: CancellationToken,
}

impl Acceptor {
    pub(crate) fn spawn(listener: Box<dyn StreamListener>, hub: ConnectionHub) -> Self {
        let token = CancellationToken::new();
        tokio::spawn(accept_loop(listener, hub, token.clone()));
        Self { token }
    }

    /// Stop accepting; the pending accept unblocks and is treated as
    /// expected shutdown, not a fault.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(
    mut listener: Box<dyn StreamListener>,
    hub: ConnectionHub,
    token: CancellationToken,
) {
    tracing::debug!("acceptor started, waiting for connections");
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(inbound) => {
                    tracing::debug!(peer = %inbound.identity, "connection accepted");
                    hub.on_connection_accepted(inbound);
                }
                Err(error) => {
                    if !token.is_cancelled() {
                        tracing::warn!(%error, "accept failed, acceptor stopping");
                    }
                    break;
                }
            }
        }
    }
    // Dropping the listener releases the underlying primitive.
}
