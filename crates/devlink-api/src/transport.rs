// ── Transport abstraction ──
//
// A transport knows how to open one physical connection to a device and
// hand it back as a `Link`: a sink for outbound frames and a stream of
// inbound frames. The stream ending (or yielding an error) is the
// connection-lost notification; dropping both halves closes the link.

use std::fmt;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Outbound half of a link.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = Error> + Send>>;

/// Inbound half of a link. `None` means the peer closed the connection.
pub type FrameStream = BoxStream<'static, Result<Bytes, Error>>;

// ── Link ─────────────────────────────────────────────────────────────

/// One open, framed connection to a device.
pub struct Link {
    peer: String,
    sink: FrameSink,
    stream: FrameStream,
}

impl Link {
    pub fn new(peer: impl Into<String>, sink: FrameSink, stream: FrameStream) -> Self {
        Self {
            peer: peer.into(),
            sink,
            stream,
        }
    }

    /// Human-readable description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write a single frame and flush it.
    ///
    /// Used by protocol handshakes before the link is split into its
    /// reader and writer halves.
    pub async fn send(&mut self, frame: Bytes) -> Result<(), Error> {
        self.sink.send(frame).await
    }

    /// Read the next inbound frame.
    pub async fn recv(&mut self) -> Option<Result<Bytes, Error>> {
        self.stream.next().await
    }

    /// Split into independently owned halves.
    pub fn into_parts(self) -> (FrameSink, FrameStream) {
        (self.sink, self.stream)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("peer", &self.peer).finish_non_exhaustive()
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// Opens links to a single device.
///
/// Implementations own whatever per-connection state the wire needs
/// (HTTP client, upgrade headers, framing); nothing is shared across
/// transport instances.
pub trait Transport: Send + Sync + 'static {
    /// Open a new link. Authentication that happens as part of the
    /// connection itself (HTTP credentials, WebSocket upgrade headers)
    /// is performed here and reported as [`Error::Authentication`].
    fn open(&self) -> BoxFuture<'_, Result<Link, Error>>;

    /// Short description for logs, e.g. `tcp://10.0.0.5:4369`.
    fn describe(&self) -> String;
}

// ── Shared wire settings ─────────────────────────────────────────────

/// How a byte stream is split into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Newline-terminated UTF-8 text.
    #[default]
    Lines,
    /// 4-byte big-endian length prefix.
    LengthDelimited,
}

/// Username/password pair for transports that authenticate at the
/// connection level.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// `Authorization` header value for this credential pair.
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password.expose_secret());
        format!("Basic {}", STANDARD.encode(raw))
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_header_encodes_credentials() {
        let auth = BasicAuth::new("admin", SecretString::from("secret".to_string()));
        assert_eq!(auth.header_value(), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn basic_auth_debug_redacts_password() {
        let auth = BasicAuth::new("admin", SecretString::from("secret".to_string()));
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret"));
    }
}
