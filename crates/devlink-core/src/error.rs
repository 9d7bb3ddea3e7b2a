// ── Core error types ──
//
// User-facing errors from devlink-core. Consumers never see socket or
// HTTP details directly: the `From<devlink_api::Error>` impl folds
// transport failures into connection-level variants, and every variant
// maps onto one `ErrorClass` for status reporting.

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;

/// Why an outstanding request was cancelled rather than answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The link dropped while the request was outstanding.
    ConnectionLost,
    /// The session was shut down by `disconnect()`.
    Disconnected,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::Disconnected => f.write_str("session disconnected"),
        }
    }
}

/// Coarse failure taxonomy surfaced to status listeners and CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    /// Bad or incomplete address or credentials.
    Configuration,
    /// Socket or transport failure; always retried with backoff.
    Communication,
    /// Undecodable payload; only that message is dropped.
    Protocol,
    /// No reply before the deadline; fails that request only.
    RequestTimeout,
    /// The link went away while a request was outstanding.
    RequestCancelled,
    /// The caller used the API incorrectly.
    Usage,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is already running")]
    AlreadyConnected,

    // ── Protocol errors ──────────────────────────────────────────────
    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    // ── Request errors ───────────────────────────────────────────────
    #[error("No reply for {key} within {timeout_ms}ms")]
    RequestTimeout { key: String, timeout_ms: u64 },

    #[error("Request {key} cancelled: {reason}")]
    RequestCancelled { key: String, reason: CancelReason },

    #[error("Request already in flight for {key}")]
    RequestInFlight { key: String },

    #[error("Command has no reply key and cannot be awaited")]
    Uncorrelated,

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Which bucket of the failure taxonomy this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Config { .. } | Self::AuthenticationFailed { .. } => ErrorClass::Configuration,
            Self::ConnectionFailed { .. } | Self::NotConnected | Self::Internal(_) => {
                ErrorClass::Communication
            }
            Self::Protocol(_) => ErrorClass::Protocol,
            Self::RequestTimeout { .. } => ErrorClass::RequestTimeout,
            Self::RequestCancelled { .. } => ErrorClass::RequestCancelled,
            Self::AlreadyConnected | Self::RequestInFlight { .. } | Self::Uncorrelated => {
                ErrorClass::Usage
            }
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<devlink_api::Error> for CoreError {
    fn from(err: devlink_api::Error) -> Self {
        if err.is_auth_failure() {
            return match err {
                devlink_api::Error::Authentication { message } => {
                    CoreError::AuthenticationFailed { message }
                }
                other => CoreError::AuthenticationFailed {
                    message: other.to_string(),
                },
            };
        }

        match err {
            devlink_api::Error::Connect { target, reason } => {
                CoreError::ConnectionFailed { target, reason }
            }
            devlink_api::Error::Timeout { target, timeout_ms } => CoreError::ConnectionFailed {
                target,
                reason: format!("timed out after {timeout_ms}ms"),
            },
            devlink_api::Error::HttpStatus { status, url } => CoreError::ConnectionFailed {
                target: url,
                reason: format!("HTTP {status}"),
            },
            devlink_api::Error::Http(ref e) => CoreError::ConnectionFailed {
                target: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            devlink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => CoreError::ConnectionFailed {
                target: String::new(),
                reason: other.to_string(),
            },
        }
    }
}
