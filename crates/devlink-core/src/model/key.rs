// ── Routing identity types ──
//
// EntityKey is the routing key carried by every decoded event and the
// lookup key of the Registry. Ids are unique within a kind only: area 1
// and zone 1 are different entities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString};

// ── EntityKind ──────────────────────────────────────────────────────

/// Category of remote entity a key refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EntityKind {
    Area,
    Zone,
    Unit,
    Button,
    Thermostat,
    Node,
    Scene,
    Variable,
    Inverter,
    /// The controller itself (panel status, bridge health).
    System,
}

// ── EntityId ────────────────────────────────────────────────────────

/// Numeric panel address or string node/device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Number(u32),
    Name(String),
}

impl EntityId {
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for EntityId {
    fn from(n: u32) -> Self {
        Self::Number(n)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        match s.parse::<u32>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Name(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

// ── EntityKey ───────────────────────────────────────────────────────

/// Kind plus id, written `kind:id` (e.g. `zone:12`, `node:1A 2B 3C 1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Error returned when a `kind:id` string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity key '{input}': {reason}")]
pub struct ParseKeyError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for EntityKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| ParseKeyError {
            input: s.to_owned(),
            reason,
        };

        let (kind, id) = s.split_once(':').ok_or_else(|| err("expected kind:id"))?;
        let kind = kind
            .trim()
            .parse::<EntityKind>()
            .map_err(|_| err("unknown entity kind"))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(err("empty id"));
        }

        Ok(Self::new(kind, id))
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── RequestKey ──────────────────────────────────────────────────────

/// What a reply is matched on: the entity it reports on ("unit status
/// for address N") or an explicit request id echoed by the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKey {
    Entity(EntityKey),
    Id(u64),
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(key) => write!(f, "{key}"),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}

impl From<EntityKey> for RequestKey {
    fn from(key: EntityKey) -> Self {
        Self::Entity(key)
    }
}
