// ── Decoded events ──

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::key::{EntityKey, RequestKey};

/// How the codec classified an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum EventClass {
    /// Push notification; goes to the entity listener only.
    Unsolicited,
    /// Answer to an earlier command.
    Reply {
        #[serde(serialize_with = "serialize_request_key")]
        request: RequestKey,
        /// The protocol also treats this reply as a status push, so it is
        /// delivered to the entity listener after resolving the request.
        also_status: bool,
    },
}

impl EventClass {
    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. })
    }
}

/// One decoded inbound message. Immutable once built; shared as
/// `Arc<Event<P>>` between the correlator, listeners and observers.
#[derive(Debug, Clone, Serialize)]
pub struct Event<P> {
    pub key: EntityKey,
    #[serde(flatten)]
    pub class: EventClass,
    pub payload: P,
    pub received_at: DateTime<Utc>,
}

impl<P> Event<P> {
    pub fn unsolicited(key: EntityKey, payload: P) -> Self {
        Self {
            key,
            class: EventClass::Unsolicited,
            payload,
            received_at: Utc::now(),
        }
    }

    pub fn reply(key: EntityKey, request: RequestKey, also_status: bool, payload: P) -> Self {
        Self {
            key,
            class: EventClass::Reply {
                request,
                also_status,
            },
            payload,
            received_at: Utc::now(),
        }
    }
}

fn serialize_request_key<S: serde::Serializer>(
    key: &RequestKey,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}
