use thiserror::Error;

/// Top-level error type for the `devlink-api` crate.
///
/// Covers every failure a device link can report: opening the
/// connection, authenticating it, and moving frames across it.
/// `devlink-core` maps these into its error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The device rejected our credentials (HTTP 401/403, refused upgrade,
    /// failed session key exchange).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Connection ──────────────────────────────────────────────────
    /// Could not reach the device (DNS, refused, unreachable).
    #[error("Cannot connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// Opening the connection took longer than allowed.
    #[error("Connection to {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    /// Socket-level failure on an established link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the link.
    #[error("Link closed: {reason}")]
    Closed { reason: String },

    // ── Protocol plumbing ───────────────────────────────────────────
    /// Frame could not be split out of the byte stream (oversized line,
    /// bad length prefix, non-UTF-8 text on a line-oriented link).
    #[error("Framing error: {0}")]
    Framing(String),

    /// WebSocket handshake or frame error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// HTTP transport error.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected HTTP status on a request/response link.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Operation the transport cannot perform.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Returns `true` if the device rejected our credentials.
    ///
    /// Retrying with the same credentials will not help until the
    /// configuration changes, but callers may still back off and retry.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::HttpStatus { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus { status, .. } => *status >= 500,
            Self::Connect { .. }
            | Self::Timeout { .. }
            | Self::Io(_)
            | Self::Closed { .. }
            | Self::WebSocket(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_auth_failures() {
        let err = Error::HttpStatus {
            status: 401,
            url: "http://envoy/api".into(),
        };
        assert!(err.is_auth_failure());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let err = Error::HttpStatus {
            status: 503,
            url: "http://envoy/api".into(),
        };
        assert!(err.is_transient());
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn framing_errors_are_not_transient() {
        assert!(!Error::Framing("line too long".into()).is_transient());
    }
}
