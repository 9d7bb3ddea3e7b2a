// devlink-core: Session lifecycle, event routing and request correlation on top of devlink-api.

pub mod backoff;
pub mod codec;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod registry;
pub mod session;
pub mod status;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::{Backoff, BackoffPolicy};
pub use codec::{Codec, CodecError, JsonCodec, JsonCommand};
pub use config::{Credentials, DEFAULT_REQUEST_TIMEOUT, Endpoint, SessionConfig};
pub use dispatch::DispatchCounts;
pub use error::{CancelReason, CoreError, ErrorClass};
pub use registry::{EntityListener, Registry};
pub use session::Session;
pub use status::{ConnectionState, OfflineReason, Status, StatusDetail, StatusListener};

pub use model::{EntityId, EntityKey, EntityKind, Event, EventClass, ParseKeyError, RequestKey};

// Transport types hosts need to build custom sessions.
pub use devlink_api::{Framing, Link, MemoryTransport, Transport};
