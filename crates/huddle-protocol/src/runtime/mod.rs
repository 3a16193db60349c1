/// Session runtime: integrates the engine modules into a live event loop.
///
/// Owns the hub, group state, message store, and session clock, and exposes
/// a channel-based API so the application layer only ever sees commands and
/// events, never raw frames or sockets.
mod r#loop;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use huddle_transport::Transport;

use crate::conn::{AuthHooks, ConnectionHub};
use crate::error::HuddleProtocolError;
use crate::group::GroupState;
use crate::session::{SessionClock, SessionConfig};
use crate::store::{MessageStore, StoreConfig};
use crate::types::ChatMessage;

// ── Configuration ─────────────────────────────────────────────────────

/// How this runtime participates in the session.
#[derive(Debug, Clone)]
pub enum SessionRole {
    /// Accept inbound peers and relay their traffic.
    Host { group_name: String, secret: String },
    /// Connect out to a host.
    Guest {
        target: String,
        group_name: String,
        secret: String,
    },
}

/// Configuration for a session runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: SessionRole,
    pub store: StoreConfig,
    pub session: SessionConfig,
}

impl RuntimeConfig {
    /// Host a group with default timing policy.
    pub fn host(group_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Host {
                group_name: group_name.into(),
                secret: secret.into(),
            },
            store: StoreConfig::default(),
            session: SessionConfig::default(),
        }
    }

    /// Join a group as guest with default timing policy.
    pub fn guest(
        target: impl Into<String>,
        group_name: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            role: SessionRole::Guest {
                target: target.into(),
                group_name: group_name.into(),
                secret: secret.into(),
            },
            store: StoreConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

// ── Commands (app → runtime) ──────────────────────────────────────────

/// Commands the application sends to the runtime event loop.
pub enum RuntimeCommand {
    /// Broadcast a chat message and echo it locally.
    SendChat { content: String },
    /// Announce departure and tear the session down.
    Leave,
    /// Query: current group members.
    GetMembers { reply: oneshot::Sender<Vec<String>> },
    /// Query: current message snapshot.
    GetMessages {
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    /// Tear down without announcing.
    Shutdown,
}

// ── Events (runtime → app) ───────────────────────────────────────────

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The host tore the session down.
    HostEnded,
    /// The inactivity watchdog fired.
    Inactivity,
    /// We left voluntarily.
    Left,
}

/// Events the application observes.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    MemberJoined { identity: String },
    MemberLeft { identity: String },
    ConnectionFailed { reason: String },
    MessageAdded { message: ChatMessage },
    /// The message sequence changed wholesale (TTL sweep or clear).
    MessagesReset { snapshot: Vec<ChatMessage> },
    SessionWarning { remaining: Duration },
    SessionEnded { reason: SessionEndReason },
}

// ── RuntimeHandle (app-facing API) ───────────────────────────────────

/// Handle to a running session runtime. Cheap to clone.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::Sender<RuntimeCommand>,
    local_identity: String,
}

impl RuntimeHandle {
    /// This device's display identity.
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    /// Broadcast a chat message to the group.
    pub async fn send_chat(&self, content: impl Into<String>) -> Result<(), HuddleProtocolError> {
        self.cmd_tx
            .send(RuntimeCommand::SendChat {
                content: content.into(),
            })
            .await
            .map_err(|_| HuddleProtocolError::RuntimeClosed)
    }

    /// Announce departure and tear the session down.
    pub async fn leave(&self) -> Result<(), HuddleProtocolError> {
        self.cmd_tx
            .send(RuntimeCommand::Leave)
            .await
            .map_err(|_| HuddleProtocolError::RuntimeClosed)
    }

    /// Current group members.
    pub async fn members(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(RuntimeCommand::GetMembers { reply: tx })
            .await;
        rx.await.unwrap_or_default()
    }

    /// Current message snapshot.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(RuntimeCommand::GetMessages { reply: tx })
            .await;
        rx.await.unwrap_or_default()
    }

    /// Tear down without announcing.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(RuntimeCommand::Shutdown).await;
    }
}

/// Channels returned to the application when the runtime starts.
pub struct RuntimeChannels {
    pub handle: RuntimeHandle,
    pub events: mpsc::UnboundedReceiver<RuntimeEvent>,
}

// ── SessionRuntime ───────────────────────────────────────────────────

/// The session runtime. Spawn it and communicate via channels.
pub struct SessionRuntime;

impl SessionRuntime {
    /// Create a fresh hub for `transport` and spawn the event loop.
    ///
    /// For hosts this binds the listener before returning, so a dead
    /// transport surfaces immediately.
    pub async fn spawn(
        transport: Box<dyn Transport>,
        config: RuntimeConfig,
    ) -> Result<RuntimeChannels, HuddleProtocolError> {
        let (hub, _initial_rx) = ConnectionHub::new(transport);
        Self::attach(hub, config).await
    }

    /// Attach to an already-running hub, e.g. one that accepted peers while
    /// a previous layer owned it.
    ///
    /// Swaps the hub's sink to this runtime and reconciles membership with
    /// the live connection set, so peers admitted before the hand-over are
    /// not lost. An already-hosting hub is NOT re-bound (that would strand
    /// accepts queued on the old acceptor).
    pub async fn attach(
        hub: ConnectionHub,
        config: RuntimeConfig,
    ) -> Result<RuntimeChannels, HuddleProtocolError> {
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();
        hub.set_sink(hub_tx);
        let local_identity = hub.local_identity();
        let group = GroupState::new();
        let (store, store_rx) = MessageStore::new(config.store.clone());
        let (clock, clock_rx) = SessionClock::new(config.session.clone());

        match &config.role {
            SessionRole::Host { group_name, secret } => {
                group.create(group_name, secret, &local_identity);
                hub.set_auth_hooks(AuthHooks {
                    verify: {
                        let group = group.clone();
                        Arc::new(move |digest: &str| group.authenticate(digest))
                    },
                    on_success: {
                        let clock = clock.clone();
                        Arc::new(move |_| clock.touch())
                    },
                    on_fail: {
                        let store = store.clone();
                        Arc::new(move |identity: &str| {
                            store.add(ChatMessage::system(format!("Auth failed: {identity}")));
                        })
                    },
                });
                if !hub.is_host() {
                    hub.start_hosting().await?;
                }
                // Pick up peers admitted before this runtime attached.
                for identity in hub.connected_identities().await {
                    group.add_member(&identity);
                }
            }
            SessionRole::Guest { target, secret, .. } => {
                hub.connect_to(target.clone(), secret);
            }
        }

        store.start_sweeper();
        clock.start();

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(r#loop::runtime_loop(
            hub,
            group,
            store,
            clock,
            config,
            local_identity.clone(),
            cmd_rx,
            hub_rx,
            store_rx,
            clock_rx,
            event_tx,
        ));

        Ok(RuntimeChannels {
            handle: RuntimeHandle {
                cmd_tx,
                local_identity,
            },
            events: event_rx,
        })
    }
}
