/// The connection hub: registry of live peer connections, host-side
/// admission, client-side connect, and broadcast fan-out.
///
/// The hub is an explicitly owned service object: the composition root
/// creates it once and passes cloned handles to whichever layer is active.
/// Swapping the event sink redirects every in-flight reader before its next
/// delivered event.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use huddle_transport::{Inbound, Outbound, Transport};

use crate::auth;
use crate::conn::acceptor::Acceptor;
use crate::conn::peer::PeerConnection;
use crate::conn::HubEvent;
use crate::error::HuddleProtocolError;
use crate::frame::{self, Frame, AUTH_REJECT_DELAY, MAX_FRAME_BYTES};
use crate::sink::EventSink;
use crate::types::FALLBACK_IDENTITY;

/// Host-side authentication hooks, installed at configuration time.
#[derive(Clone)]
pub struct AuthHooks {
    /// Decide whether an offered digest is acceptable.
    pub verify: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    /// Runs after a peer is admitted, with its identity.
    pub on_success: Arc<dyn Fn(&str) + Send + Sync>,
    /// Runs after a peer is rejected, with its identity.
    pub on_fail: Arc<dyn Fn(&str) + Send + Sync>,
}

impl AuthHooks {
    /// Hooks that verify with `verify` and ignore the outcome callbacks.
    pub fn verifying(verify: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            verify: Arc::new(verify),
            on_success: Arc::new(|_| {}),
            on_fail: Arc::new(|_| {}),
        }
    }
}

/// Central connection registry. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    transport: Box<dyn Transport>,
    sink: EventSink<HubEvent>,
    peers: Mutex<Vec<Arc<PeerConnection>>>,
    acceptor: StdMutex<Option<Acceptor>>,
    hosting: AtomicBool,
    hooks: StdMutex<Option<AuthHooks>>,
}

impl ConnectionHub {
    /// Create a hub and the receiver for its initial event sink.
    pub fn new(transport: Box<dyn Transport>) -> (Self, mpsc::UnboundedReceiver<HubEvent>) {
        let (sink, rx) = EventSink::new();
        (
            Self {
                inner: Arc::new(HubInner {
                    transport,
                    sink,
                    peers: Mutex::new(Vec::new()),
                    acceptor: StdMutex::new(None),
                    hosting: AtomicBool::new(false),
                    hooks: StdMutex::new(None),
                }),
            },
            rx,
        )
    }

    /// Swap the event sink. Every live peer reader picks up the new sink
    /// before its next delivered event.
    pub fn set_sink(&self, tx: mpsc::UnboundedSender<HubEvent>) {
        self.inner.sink.replace(tx);
    }

    /// Install the host-side authentication hooks.
    pub fn set_auth_hooks(&self, hooks: AuthHooks) {
        *self.inner.hooks.lock().expect("hub lock poisoned") = Some(hooks);
    }

    /// Display identity of the local device; placeholder when the transport
    /// cannot resolve one (never fatal).
    pub fn local_identity(&self) -> String {
        self.inner
            .transport
            .local_identity()
            .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
    }

    pub fn is_host(&self) -> bool {
        self.inner.hosting.load(Ordering::SeqCst)
    }

    // ── Host mode ────────────────────────────────────────────────────────

    /// Bind the listener and start accepting.
    ///
    /// Replaces any prior acceptor; connections queued on the old one are
    /// stranded. Call at most once per hosting session.
    pub async fn start_hosting(&self) -> Result<(), HuddleProtocolError> {
        self.inner.hosting.store(true, Ordering::SeqCst);
        let listener = self.inner.transport.bind().await?;
        let acceptor = Acceptor::spawn(listener, self.clone());
        if let Some(previous) = self
            .inner
            .acceptor
            .lock()
            .expect("hub lock poisoned")
            .replace(acceptor)
        {
            previous.cancel();
        }
        tracing::info!("hosting started, awaiting connections");
        Ok(())
    }

    /// Called by the acceptor for each accepted stream. The handshake runs
    /// on its own task so the accept loop is never blocked.
    pub(crate) fn on_connection_accepted(&self, inbound: Inbound) {
        let hub = self.clone();
        tokio::spawn(async move {
            hub.handshake(inbound).await;
        });
    }

    /// Host-side admission: AwaitingAuthFrame → Verifying → Admitted |
    /// Rejected. Runs once per stream and never re-enters.
    async fn handshake(&self, inbound: Inbound) {
        let Inbound { mut stream, identity } = inbound;
        let Some(hooks) = self
            .inner
            .hooks
            .lock()
            .expect("hub lock poisoned")
            .clone()
        else {
            tracing::warn!(peer = %identity, "no auth hooks installed, closing");
            return;
        };

        // AwaitingAuthFrame: one blocking read for the first frame.
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!(peer = %identity, "stream closed before auth");
                return;
            }
            Ok(n) => n,
            Err(error) => {
                tracing::debug!(peer = %identity, %error, "auth read failed");
                return;
            }
        };
        let text = String::from_utf8_lossy(&buf[..n]);
        let Some(offered) = text.strip_prefix(frame::AUTH_PREFIX) else {
            // Protocol violation: close without a reply.
            tracing::debug!(peer = %identity, "unexpected first frame, closing");
            return;
        };

        // Verifying
        if (hooks.verify)(offered) {
            self.admit(stream, identity, &hooks).await;
        } else {
            self.reject(stream, identity, &hooks).await;
        }
    }

    async fn admit(
        &self,
        mut stream: huddle_transport::BoxStream,
        identity: String,
        hooks: &AuthHooks,
    ) {
        let reply = async {
            stream.write_all(frame::AUTH_OK.as_bytes()).await?;
            stream.flush().await
        }
        .await;
        if let Err(error) = reply {
            tracing::debug!(peer = %identity, %error, "auth reply failed");
            return;
        }

        let peer = PeerConnection::spawn(stream, identity.clone(), self.inner.sink.clone());
        self.inner.peers.lock().await.push(Arc::clone(&peer));
        tracing::info!(peer = %identity, "peer admitted");
        self.inner.sink.emit(HubEvent::Connected {
            identity: identity.clone(),
        });
        (hooks.on_success)(&identity);

        // Announce to everyone already admitted, not to the new peer.
        self.broadcast_except(&Frame::Join { identity }.encode(), Some(&peer))
            .await;
    }

    async fn reject(
        &self,
        mut stream: huddle_transport::BoxStream,
        identity: String,
        hooks: &AuthHooks,
    ) {
        let _ = stream.write_all(frame::AUTH_FAIL.as_bytes()).await;
        let _ = stream.flush().await;
        tracing::info!(peer = %identity, "authentication rejected");
        (hooks.on_fail)(&identity);
        // Throttle hostile or misconfigured clients before closing.
        tokio::time::sleep(AUTH_REJECT_DELAY).await;
    }

    // ── Client mode ──────────────────────────────────────────────────────

    /// Connect out to a host and authenticate with the group secret.
    ///
    /// Runs on a background task; the outcome arrives as a `Connected` or
    /// `ConnectionFailed` event.
    pub fn connect_to(&self, target: impl Into<String>, secret: &str) {
        self.inner.hosting.store(false, Ordering::SeqCst);
        let digest = auth::digest(secret);
        let target = target.into();
        let hub = self.clone();
        tokio::spawn(async move {
            hub.connect_flow(target, digest).await;
        });
    }

    async fn connect_flow(&self, target: String, digest: String) {
        let outbound = match self.inner.transport.connect(&target).await {
            Ok(outbound) => outbound,
            Err(error) => {
                tracing::debug!(%target, %error, "connect failed");
                self.inner.sink.emit(HubEvent::ConnectionFailed {
                    reason: error.to_string(),
                });
                return;
            }
        };
        let Outbound { mut stream, identity } = outbound;

        let sent = async {
            stream
                .write_all(Frame::Auth { digest }.encode().as_bytes())
                .await?;
            stream.flush().await
        }
        .await;
        if let Err(error) = sent {
            self.inner.sink.emit(HubEvent::ConnectionFailed {
                reason: error.to_string(),
            });
            return;
        }

        // One blocking read for the host's verdict.
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        let reply = match stream.read(&mut buf).await {
            Ok(0) => {
                self.inner.sink.emit(HubEvent::ConnectionFailed {
                    reason: "connection closed during authentication".into(),
                });
                return;
            }
            Ok(n) => String::from_utf8_lossy(&buf[..n]).into_owned(),
            Err(error) => {
                self.inner.sink.emit(HubEvent::ConnectionFailed {
                    reason: error.to_string(),
                });
                return;
            }
        };

        if reply == frame::AUTH_OK {
            let peer = PeerConnection::spawn(stream, identity.clone(), self.inner.sink.clone());
            self.inner.peers.lock().await.push(peer);
            tracing::info!(host = %identity, "connected");
            self.inner.sink.emit(HubEvent::Connected { identity });
        } else {
            tracing::info!(host = %identity, "authentication failed");
            self.inner.sink.emit(HubEvent::ConnectionFailed {
                reason: "authentication failed".into(),
            });
        }
    }

    // ── Messaging ────────────────────────────────────────────────────────

    /// Send a frame to every live connection, sequentially.
    ///
    /// Dead connections are discovered lazily here and pruned after the
    /// pass; a failed write marks its connection dead without interrupting
    /// delivery to the rest.
    pub async fn broadcast(&self, frame_text: &str) {
        self.broadcast_except(frame_text, None).await;
    }

    async fn broadcast_except(&self, frame_text: &str, skip: Option<&Arc<PeerConnection>>) {
        let mut peers = self.inner.peers.lock().await;
        for peer in peers.iter() {
            if let Some(skip) = skip {
                if Arc::ptr_eq(peer, skip) {
                    continue;
                }
            }
            if peer.is_alive() {
                peer.send(frame_text).await;
            }
        }
        peers.retain(|p| p.is_alive());
    }

    /// Broadcast a chat frame.
    pub async fn send_chat(&self, sender: &str, content: &str) {
        self.broadcast(
            &Frame::Chat {
                sender: sender.to_string(),
                content: content.to_string(),
            }
            .encode(),
        )
        .await;
    }

    /// Identities of currently-alive connections, point-in-time.
    pub async fn connected_identities(&self) -> Vec<String> {
        self.inner
            .peers
            .lock()
            .await
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.identity().to_string())
            .collect()
    }

    pub async fn connected_count(&self) -> usize {
        self.inner
            .peers
            .lock()
            .await
            .iter()
            .filter(|p| p.is_alive())
            .count()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Best-effort session-end broadcast, then stop accepting and close
    /// every connection.
    pub async fn disconnect_all(&self) {
        self.broadcast(&Frame::SessionEnd.encode()).await;
        if let Some(acceptor) = self
            .inner
            .acceptor
            .lock()
            .expect("hub lock poisoned")
            .take()
        {
            acceptor.cancel();
        }
        let peers: Vec<_> = self.inner.peers.lock().await.drain(..).collect();
        for peer in peers {
            peer.close().await;
        }
        tracing::info!("all connections closed");
    }
}
