// ── In-memory transport ──
//
// Channel-backed links for exercising sessions and codecs without a
// device. Every successful `open` hands a `MemoryPeer` to whoever holds
// the `MemoryServer`; the peer injects inbound frames, observes what the
// session wrote, and can drop the link to simulate a lost connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{StreamExt, sink};
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::error::Error;
use crate::transport::{Link, Transport};

const PEER_NAME: &str = "memory://peer";

/// Scripted outcome for an upcoming `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    /// Nobody answered.
    Refused,
    /// The peer rejected the credentials.
    Rejected,
}

struct Shared {
    failures: Mutex<VecDeque<OpenFailure>>,
    opens: AtomicUsize,
}

/// Transport whose links are pairs of in-process channels.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
}

/// Test-side handle: receives one `MemoryPeer` per opened link.
pub struct MemoryServer {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Shared {
            failures: Mutex::new(VecDeque::new()),
            opens: AtomicUsize::new(0),
        });
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                shared: Arc::clone(&shared),
                accept_tx,
            },
            MemoryServer { shared, accept_rx },
        )
    }

    async fn open_link(&self) -> Result<Link, Error> {
        let attempt = self.shared.opens.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(failure) = self.shared.failures.lock().await.pop_front() {
            debug!(attempt, ?failure, "memory open failing as scripted");
            return Err(match failure {
                OpenFailure::Refused => Error::Connect {
                    target: PEER_NAME.into(),
                    reason: "connection refused".into(),
                },
                OpenFailure::Rejected => Error::Authentication {
                    message: "credentials rejected by peer".into(),
                },
            });
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Result<Bytes, Error>>();
        let (written_tx, written_rx) = mpsc::unbounded_channel::<Bytes>();

        let peer = MemoryPeer {
            inbound: Some(inbound_tx),
            written: written_rx,
        };
        self.accept_tx.send(peer).map_err(|_| Error::Connect {
            target: PEER_NAME.into(),
            reason: "no server listening".into(),
        })?;

        let sink = sink::unfold(written_tx, |tx, frame: Bytes| async move {
            tx.send(frame).map_err(|_| Error::Closed {
                reason: "peer dropped".into(),
            })?;
            Ok::<_, Error>(tx)
        });
        let stream = UnboundedReceiverStream::new(inbound_rx);

        debug!(attempt, "memory link opened");
        Ok(Link::new(PEER_NAME, Box::pin(sink), stream.boxed()))
    }
}

impl Transport for MemoryTransport {
    fn open(&self) -> BoxFuture<'_, Result<Link, Error>> {
        Box::pin(self.open_link())
    }

    fn describe(&self) -> String {
        PEER_NAME.into()
    }
}

impl MemoryServer {
    /// Wait for the next link the transport opens.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Make the next `count` opens fail with `failure`.
    pub async fn fail_next_opens(&self, count: usize, failure: OpenFailure) {
        let mut failures = self.shared.failures.lock().await;
        failures.extend(std::iter::repeat_n(failure, count));
    }

    /// Number of `open` calls so far, failed ones included.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

/// Device end of one memory link. Dropping it closes the link.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Bytes, Error>>>,
    written: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryPeer {
    /// Deliver a frame to the session side. Returns `false` once the
    /// link is gone.
    pub fn inject(&self, frame: impl Into<Bytes>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
    }

    /// Next frame the session wrote, or `None` after the session side
    /// dropped its sink.
    pub async fn next_written(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// End the inbound stream as if the device hung up.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Surface a transport error on the inbound stream, then hang up.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.fail_with(Error::Closed {
            reason: reason.into(),
        });
    }

    /// Like [`fail`](Self::fail), with a specific error.
    pub fn fail_with(&mut self, error: Error) {
        if let Some(tx) = self.inbound.take() {
            let _ = tx.send(Err(error));
        }
    }

    /// `true` while the session side still holds the inbound stream.
    pub fn is_connected(&self) -> bool {
        self.inbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (transport, mut server) = MemoryTransport::new();
        let mut link = transport.open().await.unwrap();
        let mut peer = server.accept().await.unwrap();

        assert!(peer.inject("hello"));
        assert_eq!(link.recv().await.unwrap().unwrap(), Bytes::from("hello"));

        link.send(Bytes::from("world")).await.unwrap();
        assert_eq!(peer.next_written().await.unwrap(), Bytes::from("world"));
    }

    #[tokio::test]
    async fn hang_up_ends_inbound_stream() {
        let (transport, mut server) = MemoryTransport::new();
        let mut link = transport.open().await.unwrap();
        let mut peer = server.accept().await.unwrap();

        peer.hang_up();
        assert!(link.recv().await.is_none());
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let (transport, server) = MemoryTransport::new();
        server.fail_next_opens(1, OpenFailure::Rejected).await;
        server.fail_next_opens(1, OpenFailure::Refused).await;

        let first = transport.open().await.unwrap_err();
        assert!(first.is_auth_failure());
        let second = transport.open().await.unwrap_err();
        assert!(second.is_transient());
        assert!(transport.open().await.is_ok());
        assert_eq!(server.open_count(), 3);
    }

    #[tokio::test]
    async fn open_without_server_fails() {
        let (transport, server) = MemoryTransport::new();
        drop(server);
        assert!(matches!(
            transport.open().await,
            Err(Error::Connect { .. })
        ));
    }
}
