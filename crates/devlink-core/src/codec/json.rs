// ── Line-oriented JSON codec ──
//
// Bundled codec for bridges that speak JSON, and the one the CLI uses.
//
// Inbound envelopes:
//
//   {"entity":"zone:3","payload":{"state":"open"}}                  push
//   {"entity":"unit:7","payload":{..},"reply":true}                 reply, keyed by entity
//   {"entity":"unit:7","payload":{..},"request_id":12,"status":true} reply by id, also a status push
//
// A frame may hold one envelope or an array of them. Bare record arrays
// (inverter production lists) can be routed by a field of each record
// via `with_bare_records`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::{Codec, CodecError, Decoded};
use crate::model::{EntityKey, EntityKind, Event, RequestKey};

/// Wrapper some embedded web servers put around JSON bodies.
const HTML_PREFIX: &str = "<html><body><pre>";
const HTML_SUFFIX: &str = "</pre></body></html>";

// ── JsonCommand ─────────────────────────────────────────────────────

/// Outbound command understood by [`JsonCodec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonCommand {
    pub entity: EntityKey,
    pub action: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub args: Value,
    /// The device answers with a reply keyed by `entity`.
    #[serde(rename = "reply", default, skip_serializing_if = "std::ops::Not::not")]
    pub expect_reply: bool,
    /// The device echoes this id in its reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl JsonCommand {
    pub fn new(entity: EntityKey, action: impl Into<String>) -> Self {
        Self {
            entity,
            action: action.into(),
            args: Value::Null,
            expect_reply: false,
            request_id: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn expecting_reply(mut self) -> Self {
        self.expect_reply = true;
        self
    }

    pub fn with_request_id(mut self, id: u64) -> Self {
        self.request_id = Some(id);
        self
    }
}

// ── JsonCodec ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    entity: EntityKey,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reply: bool,
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    status: bool,
}

#[derive(Debug, Clone)]
struct BareRecords {
    kind: EntityKind,
    field: String,
}

#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    bare_records: Option<BareRecords>,
    poll: Vec<JsonCommand>,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route objects without an `entity` field by `field`, as entities of
    /// `kind`. The whole record becomes the payload.
    pub fn with_bare_records(mut self, kind: EntityKind, field: impl Into<String>) -> Self {
        self.bare_records = Some(BareRecords {
            kind,
            field: field.into(),
        });
        self
    }

    /// Commands sent on every poll tick. They are not correlated, so the
    /// device should answer them with status pushes.
    pub fn with_poll_commands(mut self, commands: Vec<JsonCommand>) -> Self {
        self.poll = commands;
        self
    }

    fn decode_value(&self, value: Value) -> Result<Decoded<Value>, CodecError> {
        if value.get("entity").is_some() {
            let env: Envelope = serde_json::from_value(value)?;
            let request = env
                .request_id
                .map(RequestKey::Id)
                .or_else(|| env.reply.then(|| RequestKey::Entity(env.entity.clone())));
            return Ok(match request {
                Some(request) => Event::reply(env.entity, request, env.status, env.payload),
                None => Event::unsolicited(env.entity, env.payload),
            });
        }

        let Some(bare) = &self.bare_records else {
            return Err(CodecError::Malformed("object has no \"entity\" field".into()));
        };
        let id = match value.get(&bare.field) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(CodecError::Malformed(format!(
                    "record has no usable \"{}\" field",
                    bare.field
                )));
            }
        };
        Ok(Event::unsolicited(EntityKey::new(bare.kind, id), value))
    }
}

impl Codec for JsonCodec {
    type Command = JsonCommand;
    type Payload = Value;

    fn encode(&self, command: &JsonCommand) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(command)?))
    }

    fn decode(&self, frame: &[u8]) -> Result<Vec<Decoded<Value>>, CodecError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| CodecError::Malformed(format!("not UTF-8: {e}")))?
            .trim();
        let text = text
            .strip_prefix(HTML_PREFIX)
            .and_then(|t| t.strip_suffix(HTML_SUFFIX))
            .unwrap_or(text)
            .trim();

        if text.is_empty() {
            trace!("empty frame");
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(text)? {
            Value::Array(items) => items.into_iter().map(|v| self.decode_value(v)).collect(),
            value @ Value::Object(_) => Ok(vec![self.decode_value(value)?]),
            other => Err(CodecError::Malformed(format!(
                "expected object or array, got {other}"
            ))),
        }
    }

    fn request_key(&self, command: &JsonCommand) -> Option<RequestKey> {
        command
            .request_id
            .map(RequestKey::Id)
            .or_else(|| command.expect_reply.then(|| RequestKey::Entity(command.entity.clone())))
    }

    fn poll_commands(&self) -> Vec<JsonCommand> {
        self.poll.clone()
    }
}
