/// The runtime event loop.
///
/// A single task that owns dispatch: hub events, store events, clock events
/// and application commands funnel in here, so membership and message state
/// never race across contexts.
use tokio::sync::mpsc;

use crate::conn::{ConnectionHub, HubEvent};
use crate::frame::Frame;
use crate::group::GroupState;
use crate::session::{SessionClock, SessionEvent};
use crate::store::{MessageStore, StoreEvent};
use crate::types::{ChatMessage, MessageOrigin};

use super::{RuntimeCommand, RuntimeConfig, RuntimeEvent, SessionEndReason, SessionRole};

/// Whether the loop keeps running after handling one input.
#[derive(PartialEq)]
enum Flow {
    Continue,
    Stop,
}

#[allow(clippy::too_many_arguments)]
pub(super) async fn runtime_loop(
    hub: ConnectionHub,
    group: GroupState,
    store: MessageStore,
    clock: SessionClock,
    config: RuntimeConfig,
    local_identity: String,
    mut cmd_rx: mpsc::Receiver<RuntimeCommand>,
    mut hub_rx: mpsc::UnboundedReceiver<HubEvent>,
    mut store_rx: mpsc::UnboundedReceiver<StoreEvent>,
    mut clock_rx: mpsc::UnboundedReceiver<SessionEvent>,
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
) {
    let is_host = matches!(config.role, SessionRole::Host { .. });
    let group_name = match &config.role {
        SessionRole::Host { group_name, .. } | SessionRole::Guest { group_name, .. } => {
            group_name.clone()
        }
    };

    let ctx = LoopCtx {
        hub,
        group,
        store,
        clock,
        event_tx,
        local_identity,
        group_name,
        is_host,
    };

    loop {
        let flow = tokio::select! {
            Some(command) = cmd_rx.recv() => ctx.handle_command(command).await,
            Some(event) = hub_rx.recv() => ctx.handle_hub_event(event).await,
            Some(event) = store_rx.recv() => ctx.handle_store_event(event),
            Some(event) = clock_rx.recv() => ctx.handle_clock_event(event).await,
            else => Flow::Stop,
        };
        if flow == Flow::Stop {
            break;
        }
    }
}

struct LoopCtx {
    hub: ConnectionHub,
    group: GroupState,
    store: MessageStore,
    clock: SessionClock,
    event_tx: mpsc::UnboundedSender<RuntimeEvent>,
    local_identity: String,
    group_name: String,
    is_host: bool,
}

impl LoopCtx {
    fn emit(&self, event: RuntimeEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn handle_command(&self, command: RuntimeCommand) -> Flow {
        match command {
            RuntimeCommand::SendChat { content } => {
                self.store.add(ChatMessage::new(
                    self.local_identity.clone(),
                    content.clone(),
                    MessageOrigin::Local,
                ));
                self.hub.send_chat(&self.local_identity, &content).await;
                self.clock.touch();
                Flow::Continue
            }
            RuntimeCommand::Leave => {
                self.hub
                    .broadcast(
                        &Frame::Leave {
                            identity: self.local_identity.clone(),
                        }
                        .encode(),
                    )
                    .await;
                self.teardown().await;
                self.emit(RuntimeEvent::SessionEnded {
                    reason: SessionEndReason::Left,
                });
                Flow::Stop
            }
            RuntimeCommand::GetMembers { reply } => {
                let _ = reply.send(self.group.members());
                Flow::Continue
            }
            RuntimeCommand::GetMessages { reply } => {
                let _ = reply.send(self.store.snapshot());
                Flow::Continue
            }
            RuntimeCommand::Shutdown => {
                self.teardown().await;
                Flow::Stop
            }
        }
    }

    async fn handle_hub_event(&self, event: HubEvent) -> Flow {
        match event {
            HubEvent::Connected { identity } => {
                if self.is_host {
                    // Host learns membership from its own accept path.
                    self.group.add_member(&identity);
                    self.store
                        .add(ChatMessage::system(format!("{identity} joined")));
                    self.clock.touch();
                } else {
                    // Guest: the connection target is the host; seed the
                    // roster now that its identity is known.
                    self.group
                        .join_as(&self.group_name, &identity, &self.local_identity);
                }
                self.emit(RuntimeEvent::MemberJoined { identity });
                Flow::Continue
            }
            HubEvent::Disconnected { identity } => {
                if self.group.remove_member(&identity) {
                    self.store
                        .add(ChatMessage::system(format!("{identity} left")));
                    self.emit(RuntimeEvent::MemberLeft { identity });
                }
                Flow::Continue
            }
            HubEvent::ConnectionFailed { reason } => {
                self.emit(RuntimeEvent::ConnectionFailed { reason });
                Flow::Continue
            }
            HubEvent::Frame { text } => {
                self.clock.touch();
                self.handle_frame(&text).await
            }
        }
    }

    async fn handle_frame(&self, text: &str) -> Flow {
        match Frame::parse(text) {
            Some(Frame::Chat { sender, content }) => {
                self.store
                    .add(ChatMessage::new(sender, content, MessageOrigin::Remote));
                if self.is_host {
                    // Relay the raw frame to every connected peer.
                    self.hub.broadcast(text).await;
                }
                Flow::Continue
            }
            Some(Frame::Join { identity }) => {
                // Hosts learn membership via their accept path, never from
                // JOIN; guests skip their own announcement.
                if !self.is_host
                    && identity != self.local_identity
                    && self.group.add_member(&identity)
                {
                    self.store
                        .add(ChatMessage::system(format!("{identity} joined")));
                    self.emit(RuntimeEvent::MemberJoined { identity });
                }
                Flow::Continue
            }
            Some(Frame::Leave { identity }) => {
                if self.group.remove_member(&identity) {
                    self.store
                        .add(ChatMessage::system(format!("{identity} left")));
                    self.emit(RuntimeEvent::MemberLeft { identity });
                }
                Flow::Continue
            }
            Some(Frame::SessionEnd) => {
                // SESSION_END is a host-to-client frame; a departing guest's
                // teardown courtesy-broadcast must not end the host's group.
                if self.is_host {
                    return Flow::Continue;
                }
                self.store
                    .add(ChatMessage::system("Session ended by host"));
                self.teardown().await;
                self.emit(RuntimeEvent::SessionEnded {
                    reason: SessionEndReason::HostEnded,
                });
                Flow::Stop
            }
            // Stray auth frames after admission, or unknown input.
            Some(Frame::Auth { .. }) | Some(Frame::AuthOk) | Some(Frame::AuthFail) | None => {
                tracing::debug!(frame = text, "ignoring unexpected frame");
                Flow::Continue
            }
        }
    }

    fn handle_store_event(&self, event: StoreEvent) -> Flow {
        match event {
            StoreEvent::Added { message, .. } => self.emit(RuntimeEvent::MessageAdded { message }),
            StoreEvent::Reset { snapshot } => self.emit(RuntimeEvent::MessagesReset { snapshot }),
        }
        Flow::Continue
    }

    async fn handle_clock_event(&self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::Warning { remaining } => {
                let minutes = remaining.as_secs().div_ceil(60);
                self.store.add(ChatMessage::system(format!(
                    "Session expires in {minutes} min (no activity)"
                )));
                self.emit(RuntimeEvent::SessionWarning { remaining });
                Flow::Continue
            }
            SessionEvent::TimedOut => {
                self.store
                    .add(ChatMessage::system("Session ended after inactivity"));
                self.teardown().await;
                self.emit(RuntimeEvent::SessionEnded {
                    reason: SessionEndReason::Inactivity,
                });
                Flow::Stop
            }
        }
    }

    async fn teardown(&self) {
        self.hub.disconnect_all().await;
        self.clock.shutdown();
        self.store.shutdown();
        self.group.clear();
    }
}
