/// One admitted peer connection.
///
/// Owns the only reference to its duplex stream, split into a reader task
/// and a mutex-guarded writer. The reader treats every successful read as
/// one whole frame: the transport's read boundaries are the framing, with
/// no reassembly across partial reads (wire-compatible hazard, see the
/// frame module).
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use huddle_transport::BoxStream;

use crate::conn::HubEvent;
use crate::frame::MAX_FRAME_BYTES;
use crate::sink::EventSink;

pub struct PeerConnection {
    identity: String,
    writer: Mutex<WriteHalf<BoxStream>>,
    alive: AtomicBool,
    /// Cleared by `close()` BEFORE the stream is torn down, so the reader
    /// can tell an orderly shutdown from a peer-initiated failure.
    running: AtomicBool,
    shutdown: CancellationToken,
    sink: EventSink<HubEvent>,
}

impl PeerConnection {
    /// Take ownership of a stream and start its reader task.
    pub fn spawn(stream: BoxStream, identity: String, sink: EventSink<HubEvent>) -> Arc<Self> {
        let (reader, writer) = tokio::io::split(stream);
        let conn = Arc::new(Self {
            identity,
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
            running: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            sink,
        });
        tokio::spawn(Self::read_loop(Arc::clone(&conn), reader));
        conn
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// True until EOF, a read/write failure, or `close()`.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Write one frame and flush.
    ///
    /// Failure marks the connection dead and notifies the sink; it never
    /// propagates to a fan-out caller.
    pub async fn send(&self, frame: &str) {
        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(error) = result {
            tracing::debug!(peer = %self.identity, %error, "write failed");
            self.alive.store(false, Ordering::SeqCst);
            self.sink.emit(HubEvent::Disconnected {
                identity: self.identity.clone(),
            });
        }
    }

    /// Tear the connection down. Idempotent; the unblocked reader stays
    /// silent because `running` is already false.
    pub async fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    async fn read_loop(conn: Arc<Self>, mut reader: ReadHalf<BoxStream>) {
        let mut buf = vec![0u8; MAX_FRAME_BYTES];
        loop {
            tokio::select! {
                _ = conn.shutdown.cancelled() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        conn.reader_ended("stream closed by peer");
                        break;
                    }
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                        conn.sink.emit(HubEvent::Frame { text });
                    }
                    Err(error) => {
                        conn.reader_ended(&error.to_string());
                        break;
                    }
                }
            }
        }
    }

    fn reader_ended(&self, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        // Quiet when close() already ran: no spurious disconnect events
        // during orderly shutdown.
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!(peer = %self.identity, reason, "connection lost");
            self.sink.emit(HubEvent::Disconnected {
                identity: self.identity.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pipe() -> (BoxStream, BoxStream) {
        let (a, b) = tokio::io::duplex(4096);
        (Box::new(a), Box::new(b))
    }

    async fn next_event(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<HubEvent>,
    ) -> HubEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
    }

    #[tokio::test]
    async fn reader_emits_one_frame_per_read() {
        let (ours, theirs) = pipe();
        let (sink, mut rx) = EventSink::new();
        let _conn = PeerConnection::spawn(ours, "phone".into(), sink);

        let mut remote = theirs;
        remote.write_all(b"MSG:Alice:hello").await.unwrap();
        remote.flush().await.unwrap();

        match next_event(&mut rx).await {
            HubEvent::Frame { text } => assert_eq!(text, "MSG:Alice:hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_reaches_the_remote() {
        let (ours, theirs) = pipe();
        let (sink, _rx) = EventSink::new();
        let conn = PeerConnection::spawn(ours, "phone".into(), sink);

        conn.send("JOIN:Bob").await;
        let mut remote = theirs;
        let mut buf = [0u8; 8];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"JOIN:Bob");
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn remote_close_fires_disconnected() {
        let (ours, theirs) = pipe();
        let (sink, mut rx) = EventSink::new();
        let conn = PeerConnection::spawn(ours, "phone".into(), sink);

        drop(theirs);
        match next_event(&mut rx).await {
            HubEvent::Disconnected { identity } => assert_eq!(identity, "phone"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn local_close_is_silent() {
        let (ours, theirs) = pipe();
        let (sink, mut rx) = EventSink::new();
        let conn = PeerConnection::spawn(ours, "phone".into(), sink);

        conn.close().await;
        conn.close().await; // idempotent
        assert!(!conn.is_alive());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "orderly close must not notify");
        drop(theirs);
    }

    #[tokio::test]
    async fn send_after_remote_close_marks_dead_and_notifies() {
        let (ours, theirs) = pipe();
        let (sink, mut rx) = EventSink::new();
        let conn = PeerConnection::spawn(ours, "phone".into(), sink);

        drop(theirs);
        // Reader notices EOF first.
        match next_event(&mut rx).await {
            HubEvent::Disconnected { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }

        // Writes into a closed pipe fail; the connection stays dead and the
        // failure never propagates.
        conn.send("MSG:Alice:late").await;
        assert!(!conn.is_alive());
    }
}
