// ── Codec seam ──
//
// The vendor-specific half of a session. A codec turns commands into
// wire frames and wire frames into routed events; the core only ever
// looks at the routing key and the reply classification it produces.

pub mod json;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use thiserror::Error;

use devlink_api::Link;

use crate::config::Credentials;
use crate::error::CoreError;
use crate::model::{Event, RequestKey};

pub use json::{JsonCodec, JsonCommand};

/// A frame could not be encoded or decoded. Decoding failures drop that
/// single frame; the link stays up.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// One decoded message, ready for dispatch.
pub type Decoded<P> = Event<P>;

/// Vendor protocol adapter consumed by [`Session`](crate::Session).
pub trait Codec: Send + Sync + 'static {
    /// Outbound command type.
    type Command: Send + Sync + 'static;
    /// Opaque decoded payload handed to listeners.
    type Payload: Send + Sync + 'static;

    fn encode(&self, command: &Self::Command) -> Result<Bytes, CodecError>;

    /// Decode one inbound frame. A frame may carry several statuses
    /// (object-status messages) or none at all (keep-alives).
    fn decode(&self, frame: &[u8]) -> Result<Vec<Decoded<Self::Payload>>, CodecError>;

    /// Key the reply to `command` will carry, or `None` when the command
    /// gets no reply.
    fn request_key(&self, command: &Self::Command) -> Option<RequestKey>;

    /// Commands sent on every poll tick to refresh entity state.
    fn poll_commands(&self) -> Vec<Self::Command> {
        Vec::new()
    }

    /// Protocol-level login run after the transport opens and before the
    /// session is marked online (e.g. a binary session-key exchange).
    fn handshake<'a>(
        &'a self,
        _link: &'a mut Link,
        _credentials: &'a Credentials,
    ) -> BoxFuture<'a, Result<(), CoreError>> {
        Box::pin(future::ready(Ok(())))
    }
}
