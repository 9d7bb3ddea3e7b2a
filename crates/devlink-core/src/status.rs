// ── Connection state and status reporting ──

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Lifecycle state of a session, owned by its supervisor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Online,
    /// Waiting `delay` before attempt number `attempt`.
    Reconnecting {
        attempt: u32,
        #[serde(rename = "delay_secs", serialize_with = "serialize_secs")]
        delay: Duration,
    },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::Online => f.write_str("online"),
            Self::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {attempt} in {}s)", delay.as_secs())
            }
        }
    }
}

/// Why a session is offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusDetail {
    /// Bad address or rejected credentials.
    ConfigurationError,
    /// Transport failure.
    CommunicationError,
    /// Not started, or stopped on request.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineReason {
    pub detail: StatusDetail,
    pub message: String,
}

impl OfflineReason {
    pub fn new(detail: StatusDetail, message: impl Into<String>) -> Self {
        Self {
            detail,
            message: message.into(),
        }
    }

    pub(crate) fn stopped() -> Self {
        Self::new(StatusDetail::None, "disconnected")
    }
}

impl fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.detail, self.message)
    }
}

/// User-visible status, coarser than [`ConnectionState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Online,
    Offline(OfflineReason),
}

impl Status {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Host-side hook for online/offline transitions.
pub trait StatusListener: Send + Sync {
    fn on_online(&self);
    fn on_offline(&self, reason: &OfflineReason);
}

fn serialize_secs<S: serde::Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(delay.as_secs_f64())
}
