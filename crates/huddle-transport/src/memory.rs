/// In-memory transport for tests and single-process wiring.
///
/// A [`MemoryNet`] is a registry of named endpoints. Connecting to a name
/// creates a `tokio::io::duplex` pair: one half goes to the listener bound
/// under that name, the other half is returned to the caller. The connecting
/// endpoint's own name travels with the inbound half, mirroring how a real
/// short-range transport reports the remote device's display name.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{HuddleTransportError, Inbound, Outbound, StreamListener, Transport};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Registry of in-process endpoints, connectable by name.
#[derive(Clone, Default)]
pub struct MemoryNet {
    listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Inbound>>>>,
}

impl MemoryNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport endpoint with the given display identity.
    pub fn endpoint(&self, identity: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            net: self.clone(),
            identity: identity.into(),
        }
    }
}

/// One named endpoint on a [`MemoryNet`].
pub struct MemoryTransport {
    net: MemoryNet,
    identity: String,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&self) -> Result<Box<dyn StreamListener>, HuddleTransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Re-binding a name replaces the previous listener; connections queued
        // on the old one are stranded, matching the hosting-restart hazard.
        self.net
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .insert(self.identity.clone(), tx);
        Ok(Box::new(MemoryListener {
            identity: self.identity.clone(),
            pending: rx,
        }))
    }

    async fn connect(&self, target: &str) -> Result<Outbound, HuddleTransportError> {
        let listener_tx = self
            .net
            .listeners
            .lock()
            .expect("listener registry poisoned")
            .get(target)
            .cloned()
            .ok_or_else(|| HuddleTransportError::Unreachable {
                target: target.to_string(),
            })?;

        let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
        listener_tx
            .send(Inbound {
                stream: Box::new(theirs),
                identity: self.identity.clone(),
            })
            .map_err(|_| HuddleTransportError::Unreachable {
                target: target.to_string(),
            })?;

        Ok(Outbound {
            stream: Box::new(ours),
            identity: target.to_string(),
        })
    }

    fn local_identity(&self) -> Option<String> {
        Some(self.identity.clone())
    }
}

struct MemoryListener {
    identity: String,
    pending: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl StreamListener for MemoryListener {
    async fn accept(&mut self) -> Result<Inbound, HuddleTransportError> {
        self.pending
            .recv()
            .await
            .ok_or(HuddleTransportError::ListenerClosed)
    }

    fn local_target(&self) -> Option<String> {
        Some(self.identity.clone())
    }
}
