// ── Raw TCP transport ──
//
// Persistent socket to a panel or controller that speaks a framed
// binary or line protocol. Framing is delegated to `tokio_util::codec`;
// any session-level handshake happens above this layer.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::error::Error;
use crate::transport::{Framing, Link, Transport};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Opens framed TCP connections to `host:port`.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    framing: Framing,
    connect_timeout: Duration,
    max_frame_len: usize,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            framing: Framing::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Largest frame accepted from the peer before the link is failed.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    async fn open_link(&self) -> Result<Link, Error> {
        let target = self.describe();
        let timeout_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX);

        let socket = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| Error::Timeout {
            target: target.clone(),
            timeout_ms,
        })?
        .map_err(|e| Error::Connect {
            target: target.clone(),
            reason: e.to_string(),
        })?;
        socket.set_nodelay(true)?;
        debug!(peer = %target, framing = ?self.framing, "TCP socket connected");

        let link = match self.framing {
            Framing::Lines => {
                let framed =
                    Framed::new(socket, LinesCodec::new_with_max_length(self.max_frame_len));
                let (sink, stream) = framed.split::<String>();
                let sink = sink.sink_map_err(lines_error).with(|frame: Bytes| {
                    future::ready(
                        String::from_utf8(frame.to_vec()).map_err(|e| Error::Framing(e.to_string())),
                    )
                });
                let stream = stream.map(|line| line.map(Bytes::from).map_err(lines_error));
                Link::new(target, Box::pin(sink), stream.boxed())
            }
            Framing::LengthDelimited => {
                let codec = LengthDelimitedCodec::builder()
                    .max_frame_length(self.max_frame_len)
                    .new_codec();
                let (sink, stream) = Framed::new(socket, codec).split::<Bytes>();
                let sink = sink.sink_map_err(Error::Io);
                let stream = stream.map(|frame| frame.map(BytesMut::freeze).map_err(Error::Io));
                Link::new(target, Box::pin(sink), stream.boxed())
            }
        };

        Ok(link)
    }
}

impl Transport for TcpTransport {
    fn open(&self) -> BoxFuture<'_, Result<Link, Error>> {
        Box::pin(self.open_link())
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

fn lines_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::Io(e) => Error::Io(e),
        LinesCodecError::MaxLineLengthExceeded => Error::Framing("line exceeds maximum length".into()),
    }
}
