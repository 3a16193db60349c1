/// End-to-end hub tests over the in-memory transport.
///
/// A host hub authenticates against a `GroupState`; guests join through
/// real handshakes on real (in-process) duplex streams.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use huddle_protocol::{auth, AuthHooks, ConnectionHub, GroupState, HubEvent};
use huddle_transport::{BoxStream, MemoryNet, Transport};

const HOST: &str = "host-phone";

async fn start_host(
    net: &MemoryNet,
    secret: &str,
) -> (ConnectionHub, mpsc::UnboundedReceiver<HubEvent>, GroupState) {
    let group = GroupState::new();
    group.create("Party", secret, HOST);
    let (hub, rx) = ConnectionHub::new(Box::new(net.endpoint(HOST)));
    let verify_group = group.clone();
    hub.set_auth_hooks(AuthHooks::verifying(move |digest| {
        verify_group.authenticate(digest)
    }));
    hub.start_hosting().await.unwrap();
    (hub, rx, group)
}

fn guest_hub(net: &MemoryNet, name: &str) -> (ConnectionHub, mpsc::UnboundedReceiver<HubEvent>) {
    ConnectionHub::new(Box::new(net.endpoint(name)))
}

/// Handshake directly against the wire, bypassing the hub client flow.
async fn raw_join(net: &MemoryNet, name: &str, secret: &str) -> BoxStream {
    let transport = net.endpoint(name);
    let mut out = transport.connect(HOST).await.unwrap();
    out.stream
        .write_all(format!("AUTH:{}", auth::digest(secret)).as_bytes())
        .await
        .unwrap();
    out.stream.flush().await.unwrap();
    let mut buf = [0u8; 64];
    let n = out.stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"AUTH_OK");
    out.stream
}

async fn wait_for<T>(
    rx: &mut mpsc::UnboundedReceiver<HubEvent>,
    mut pick: impl FnMut(&HubEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if let Some(value) = pick(&event) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn connected(event: &HubEvent) -> Option<String> {
    match event {
        HubEvent::Connected { identity } => Some(identity.clone()),
        _ => None,
    }
}

fn frame_text(event: &HubEvent) -> Option<String> {
    match event {
        HubEvent::Frame { text } => Some(text.clone()),
        _ => None,
    }
}

#[tokio::test]
async fn admission_announces_join_to_other_peers() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

    let net = MemoryNet::new();
    let (host, mut host_rx, _group) = start_host(&net, "abcd").await;

    let (guest1, mut guest1_rx) = guest_hub(&net, "guest-1");
    guest1.connect_to(HOST, "abcd");
    assert_eq!(wait_for(&mut guest1_rx, connected).await, HOST);
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-1");
    assert_eq!(host.connected_identities().await, vec!["guest-1"]);

    let (guest2, mut guest2_rx) = guest_hub(&net, "guest-2");
    guest2.connect_to(HOST, "abcd");
    assert_eq!(wait_for(&mut guest2_rx, connected).await, HOST);
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-2");

    // The first guest hears about the second; the new peer itself does not.
    assert_eq!(wait_for(&mut guest1_rx, frame_text).await, "JOIN:guest-2");
    assert_eq!(
        host.connected_identities().await,
        vec!["guest-1", "guest-2"]
    );
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let net = MemoryNet::new();
    let group = GroupState::new();
    group.create("Party", "abcd", HOST);
    let rejected = Arc::new(AtomicUsize::new(0));
    let admitted = Arc::new(AtomicUsize::new(0));

    let (host, _host_rx) = ConnectionHub::new(Box::new(net.endpoint(HOST)));
    let verify_group = group.clone();
    host.set_auth_hooks(AuthHooks {
        verify: Arc::new(move |digest| verify_group.authenticate(digest)),
        on_success: {
            let admitted = Arc::clone(&admitted);
            Arc::new(move |_| {
                admitted.fetch_add(1, Ordering::SeqCst);
            })
        },
        on_fail: {
            let rejected = Arc::clone(&rejected);
            Arc::new(move |_| {
                rejected.fetch_add(1, Ordering::SeqCst);
            })
        },
    });
    host.start_hosting().await.unwrap();

    let (guest, mut guest_rx) = guest_hub(&net, "guest-1");
    guest.connect_to(HOST, "WRONG");
    let reason = wait_for(&mut guest_rx, |event| match event {
        HubEvent::ConnectionFailed { reason } => Some(reason.clone()),
        _ => None,
    })
    .await;
    assert_eq!(reason, "authentication failed");

    assert!(host.connected_identities().await.is_empty());
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
    assert_eq!(admitted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_target_surfaces_connection_failed() {
    let net = MemoryNet::new();
    let (guest, mut guest_rx) = guest_hub(&net, "guest-1");
    guest.connect_to("nobody-hosting", "abcd");

    let reason = wait_for(&mut guest_rx, |event| match event {
        HubEvent::ConnectionFailed { reason } => Some(reason.clone()),
        _ => None,
    })
    .await;
    assert_eq!(reason, "no endpoint listening at nobody-hosting");
}

#[tokio::test]
async fn protocol_violation_is_closed_without_reply() {
    let net = MemoryNet::new();
    let (host, _host_rx, _group) = start_host(&net, "abcd").await;

    let transport = net.endpoint("intruder");
    let mut out = transport.connect(HOST).await.unwrap();
    out.stream.write_all(b"HELLO").await.unwrap();
    out.stream.flush().await.unwrap();

    // The host closes the stream with no reply at all.
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), out.stream.read(&mut buf))
        .await
        .expect("host never closed the stream")
        .unwrap();
    assert_eq!(n, 0);
    assert!(host.connected_identities().await.is_empty());
}

#[tokio::test]
async fn chat_fanout_reaches_every_peer_with_colons_intact() {
    let net = MemoryNet::new();
    let (host, mut host_rx, _group) = start_host(&net, "abcd").await;

    let mut guest1 = raw_join(&net, "guest-1", "abcd").await;
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-1");
    let mut guest2 = raw_join(&net, "guest-2", "abcd").await;
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-2");

    // Drain guest-1's JOIN announcement so the chat frame arrives alone
    // (frames merge when a raw reader lags behind two writes).
    let mut buf = [0u8; 256];
    let n = guest1.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"JOIN:guest-2");

    host.send_chat("Alice", "hi:there").await;

    let n = guest1.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"MSG:Alice:hi:there");
    let n = guest2.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"MSG:Alice:hi:there");
}

#[tokio::test]
async fn dead_connection_is_pruned_on_broadcast() {
    let net = MemoryNet::new();
    let (host, mut host_rx, _group) = start_host(&net, "abcd").await;

    let guest1 = raw_join(&net, "guest-1", "abcd").await;
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-1");
    let _guest2 = raw_join(&net, "guest-2", "abcd").await;
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-2");

    drop(guest1);
    let gone = wait_for(&mut host_rx, |event| match event {
        HubEvent::Disconnected { identity } => Some(identity.clone()),
        _ => None,
    })
    .await;
    assert_eq!(gone, "guest-1");

    host.broadcast("MSG:host-phone:anyone there?").await;
    assert_eq!(host.connected_identities().await, vec!["guest-2"]);
    assert_eq!(host.connected_count().await, 1);
}

#[tokio::test]
async fn sink_swap_is_visible_to_inflight_readers() {
    let net = MemoryNet::new();
    let (host, mut old_rx, _group) = start_host(&net, "abcd").await;

    let mut guest = raw_join(&net, "guest-1", "abcd").await;
    assert_eq!(wait_for(&mut old_rx, connected).await, "guest-1");

    let (new_tx, mut new_rx) = mpsc::unbounded_channel();
    host.set_sink(new_tx);

    guest.write_all(b"MSG:guest-1:after the swap").await.unwrap();
    guest.flush().await.unwrap();

    let text = wait_for(&mut new_rx, frame_text).await;
    assert_eq!(text, "MSG:guest-1:after the swap");
    assert!(old_rx.try_recv().is_err(), "old sink must stay quiet");
}

#[tokio::test]
async fn disconnect_all_sends_session_end_and_clears() {
    let net = MemoryNet::new();
    let (host, mut host_rx, _group) = start_host(&net, "abcd").await;

    let mut guest = raw_join(&net, "guest-1", "abcd").await;
    assert_eq!(wait_for(&mut host_rx, connected).await, "guest-1");

    host.disconnect_all().await;

    let mut buf = [0u8; 64];
    let n = guest.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"SESSION_END");
    assert!(host.connected_identities().await.is_empty());
}
