//! WebSocket subscription transport.
//!
//! Opens a WebSocket to a controller's event subscription endpoint with a
//! credential-bearing upgrade request (authorization header, optional
//! subprotocol and origin). Text and binary frames both surface as raw
//! frames; a close frame or a stream error ends the link. Reconnection is
//! not handled here -- the session layer decides when to reopen.
//!
//! # Example
//!
//! ```rust,ignore
//! use devlink_api::websocket::WebSocketTransport;
//! use devlink_api::Transport;
//! use url::Url;
//!
//! let transport = WebSocketTransport::new(Url::parse("ws://192.168.1.20/rest/subscribe")?)
//!     .with_subprotocol("ISYSUB")
//!     .with_origin("com.universal-devices.websockets.isy");
//!
//! let mut link = transport.open().await?;
//! while let Some(frame) = link.recv().await {
//!     println!("{:?}", frame?);
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{BasicAuth, Link, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── WebSocketTransport ───────────────────────────────────────────────

/// Opens WebSocket links with a fixed set of upgrade headers.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    headers: Vec<(String, String)>,
    subprotocol: Option<String>,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            subprotocol: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Add an arbitrary header to the upgrade request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send HTTP basic credentials on the upgrade request.
    pub fn with_basic_auth(self, auth: &BasicAuth) -> Self {
        self.with_header("Authorization", auth.header_value())
    }

    pub fn with_origin(self, origin: impl Into<String>) -> Self {
        self.with_header("Origin", origin)
    }

    /// Request a `Sec-WebSocket-Protocol` during the handshake.
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn open_link(&self) -> Result<Link, Error> {
        info!(url = %self.url, "Connecting to WebSocket");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocket(e.to_string()))?;

        let mut request = ClientRequestBuilder::new(uri);
        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        if let Some(ref protocol) = self.subprotocol {
            request = request.with_sub_protocol(protocol.clone());
        }

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| Error::Timeout {
                    target: self.url.to_string(),
                    timeout_ms: u64::try_from(self.connect_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })?
                .map_err(handshake_error)?;

        info!("WebSocket connected");

        let (write, mut read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| Error::WebSocket(e.to_string()))
            .with(|frame: Bytes| future::ready(Ok::<_, Error>(frame_to_message(frame))));

        let stream = async_stream::stream! {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => yield Ok(Bytes::copy_from_slice(text.as_bytes())),
                    Ok(Message::Binary(data)) => yield Ok(data),
                    Ok(Message::Ping(_)) => {
                        // tungstenite handles pong replies automatically
                        trace!("WebSocket ping");
                    }
                    Ok(Message::Close(frame)) => {
                        if let Some(ref cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
                        } else {
                            info!("WebSocket close frame received (no payload)");
                        }
                        break;
                    }
                    Ok(_) => {
                        // Pong, raw Frame -- ignore
                    }
                    Err(e) => {
                        yield Err(Error::WebSocket(e.to_string()));
                        break;
                    }
                }
            }
            debug!("WebSocket stream ended");
        };

        Ok(Link::new(self.url.to_string(), Box::pin(sink), stream.boxed()))
    }
}

impl Transport for WebSocketTransport {
    fn open(&self) -> BoxFuture<'_, Result<Link, Error>> {
        Box::pin(self.open_link())
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Text when the frame is valid UTF-8, binary otherwise.
fn frame_to_message(frame: Bytes) -> Message {
    match String::from_utf8(frame.to_vec()) {
        Ok(text) => Message::text(text),
        Err(e) => Message::binary(e.into_bytes()),
    }
}

/// Classify a failed upgrade: a 401/403 answer means our credentials were
/// refused, anything else is a connection problem.
fn handshake_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(ref response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            Error::Authentication {
                message: format!("upgrade rejected with HTTP {}", response.status()),
            }
        }
        other => Error::WebSocket(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn utf8_frames_become_text_messages() {
        let message = frame_to_message(Bytes::from_static(b"<Event/>"));
        assert!(message.is_text());
    }

    #[test]
    fn binary_frames_stay_binary() {
        let message = frame_to_message(Bytes::from_static(&[0xff, 0x00, 0x10]));
        assert!(message.is_binary());
    }

    #[test]
    fn builder_collects_upgrade_headers() {
        let url = Url::parse("ws://isy.local/rest/subscribe").unwrap();
        let transport = WebSocketTransport::new(url)
            .with_subprotocol("ISYSUB")
            .with_origin("com.universal-devices.websockets.isy");

        assert_eq!(transport.subprotocol.as_deref(), Some("ISYSUB"));
        assert_eq!(transport.headers.len(), 1);
        assert_eq!(transport.describe(), "ws://isy.local/rest/subscribe");
    }
}
