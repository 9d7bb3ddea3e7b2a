//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use devlink_config::ConfigError;
use devlink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONFIG: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {target}")]
    #[diagnostic(
        code(devlink::connection_failed),
        help(
            "Check that the device is powered and reachable.\n\
             Reason: {reason}\n\
             Run with -v to see each connection attempt."
        )
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Request {key} was cancelled: {reason}")]
    #[diagnostic(code(devlink::request_cancelled))]
    Cancelled { key: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(devlink::auth_failed),
        help(
            "Verify the credentials of the active profile.\n\
             Store a secret with: devlink config set-secret password"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(devlink::no_credentials),
        help(
            "Add them to the profile, store them with `devlink config set-secret`,\n\
             or set DEVLINK_PASSWORD / DEVLINK_TOKEN / DEVLINK_SESSION_KEY."
        )
    )]
    NoCredentials { profile: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(devlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("Profile is incomplete: {reason}")]
    #[diagnostic(
        code(devlink::incomplete),
        help("Run: devlink config validate")
    )]
    Incomplete { reason: String },

    #[error(transparent)]
    #[diagnostic(code(devlink::config))]
    Config(Box<ConfigError>),

    // ── Requests ─────────────────────────────────────────────────────

    #[error("{what} timed out after {millis}ms")]
    #[diagnostic(
        code(devlink::timeout),
        help("Increase the wait with --timeout / --connect-timeout or check the device.")
    )]
    Timeout { what: String, millis: u64 },

    #[error("Protocol error: {message}")]
    #[diagnostic(code(devlink::protocol))]
    Protocol { message: String },

    // ── Usage ────────────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devlink::validation))]
    Validation { field: String, reason: String },

    #[error("{message}")]
    #[diagnostic(code(devlink::usage))]
    Usage { message: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(devlink::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(devlink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Cancelled { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Usage { .. } => exit_code::USAGE,
            Self::ProfileNotFound { .. } | Self::Incomplete { .. } | Self::Config(_) => {
                exit_code::CONFIG
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { target, reason } => {
                CliError::ConnectionFailed { target, reason }
            }

            CoreError::NotConnected => CliError::ConnectionFailed {
                target: "(not connected)".into(),
                reason: "the session is not online".into(),
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Config { message } => CliError::Incomplete { reason: message },

            CoreError::RequestTimeout { key, timeout_ms } => CliError::Timeout {
                what: format!("Request {key}"),
                millis: timeout_ms,
            },

            CoreError::RequestCancelled { key, reason } => CliError::Cancelled {
                key,
                reason: reason.to_string(),
            },

            CoreError::Protocol(e) => CliError::Protocol {
                message: e.to_string(),
            },

            err @ (CoreError::AlreadyConnected
            | CoreError::RequestInFlight { .. }
            | CoreError::Uncorrelated) => CliError::Usage {
                message: err.to_string(),
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Incomplete {
                reason: format!("{field}: {reason}"),
            },
            ConfigError::Incomplete { source, .. } => CliError::Incomplete {
                reason: source.to_string(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devlink_core::CancelReason;

    #[test]
    fn exit_codes_follow_error_class() {
        let cases = [
            (
                CoreError::AuthenticationFailed {
                    message: "bad key".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::ConnectionFailed {
                    target: "tcp://panel:4369".into(),
                    reason: "refused".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::RequestTimeout {
                    key: "unit:1".into(),
                    timeout_ms: 5000,
                },
                exit_code::TIMEOUT,
            ),
            (
                CoreError::RequestCancelled {
                    key: "unit:1".into(),
                    reason: CancelReason::ConnectionLost,
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Config {
                    message: "port must be non-zero".into(),
                },
                exit_code::CONFIG,
            ),
            (CoreError::Uncorrelated, exit_code::USAGE),
        ];

        for (core, expected) in cases {
            let shown = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), expected, "{shown}");
        }
    }

    #[test]
    fn missing_credentials_is_an_auth_failure() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "panel".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
