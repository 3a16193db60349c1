//! Huddle protocol engine.
//!
//! Ephemeral, server-less group messaging over a connection-oriented
//! short-range transport: one device hosts and accepts inbound streams,
//! peers form a star, and all traffic flows through the host, which fans
//! broadcasts out to every admitted peer.
//!
//! Wire format: single-write UTF-8 text frames (`AUTH:`, `MSG:`, `JOIN:`,
//! ...). Authentication: SHA-256 digest of a shared group secret. Messages
//! live in memory only and expire on a TTL; an inactivity watchdog ends the
//! whole session.

pub mod auth;
pub mod conn;
pub mod error;
pub mod frame;
pub mod group;
pub mod runtime;
pub mod session;
pub mod sink;
pub mod store;
pub mod types;

pub use conn::{AuthHooks, ConnectionHub, HubEvent};
pub use error::HuddleProtocolError;
pub use frame::Frame;
pub use group::GroupState;
pub use runtime::{
    RuntimeChannels, RuntimeCommand, RuntimeConfig, RuntimeEvent, RuntimeHandle, SessionEndReason,
    SessionRole, SessionRuntime,
};
pub use session::{SessionClock, SessionConfig, SessionEvent};
pub use sink::EventSink;
pub use store::{MessageStore, StoreConfig, StoreEvent};
pub use types::{now_ms, ChatMessage, MessageKind, MessageOrigin};
