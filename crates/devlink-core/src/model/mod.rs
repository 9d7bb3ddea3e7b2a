// ── Domain model ──
//
// Routing keys and decoded events. Payloads stay opaque to the core:
// only the key and the reply classification are ever inspected.

pub mod event;
pub mod key;

pub use event::{Event, EventClass};
pub use key::{EntityId, EntityKey, EntityKind, ParseKeyError, RequestKey};
