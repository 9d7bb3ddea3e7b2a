// ── Runtime session configuration ──
//
// These types describe *how* to reach one device. They carry credential
// data and connection tuning, but never touch disk: devlink-config (or
// an embedding host) builds a `SessionConfig` and hands it in.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use devlink_api::{BasicAuth, Framing, HttpTransport, TcpTransport, Transport, WebSocketTransport};

use crate::backoff::BackoffPolicy;
use crate::error::CoreError;

/// Default bounded wait for a correlated reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── Endpoint ─────────────────────────────────────────────────────────

/// Where the device lives and which transport reaches it.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Framed TCP socket (alarm panels, binary controller protocols).
    Tcp {
        host: String,
        port: u16,
        framing: Framing,
    },
    /// WebSocket event subscription.
    WebSocket {
        url: Url,
        subprotocol: Option<String>,
        origin: Option<String>,
    },
    /// HTTP request/response, polled every `poll_interval`.
    Http { url: Url },
}

impl Endpoint {
    fn host(&self) -> Option<&str> {
        match self {
            Self::Tcp { host, .. } => Some(host.as_str()),
            Self::WebSocket { url, .. } | Self::Http { url } => url.host_str(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port, .. } => write!(f, "tcp://{host}:{port}"),
            Self::WebSocket { url, .. } | Self::Http { url } => write!(f, "{url}"),
        }
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Credential material for the transport or the codec handshake.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// No authentication.
    None,
    /// Username/password (HTTP auth, WebSocket upgrade).
    Password {
        username: String,
        password: SecretString,
    },
    /// Opaque bearer token.
    Token(SecretString),
    /// 16-byte session key given as two 8-byte hex halves, used by a
    /// codec handshake rather than the transport.
    SessionKey { key1: String, key2: String },
}

impl Credentials {
    /// Decode a `SessionKey` into its 16 raw bytes.
    ///
    /// Each half is 16 hex digits; spaces and `-` inside a half are
    /// ignored (`00-11-22-33-44-55-66-77`).
    pub fn session_key_bytes(&self) -> Result<[u8; 16], CoreError> {
        let Self::SessionKey { key1, key2 } = self else {
            return Err(CoreError::config("credentials are not a session key"));
        };

        let mut out = [0u8; 16];
        let (first, second) = out.split_at_mut(8);
        decode_half(key1, first).map_err(|m| CoreError::config(format!("key1: {m}")))?;
        decode_half(key2, second).map_err(|m| CoreError::config(format!("key2: {m}")))?;
        Ok(out)
    }

    /// Parse the `key1:key2` shorthand.
    pub fn session_key(joined: &str) -> Result<Self, CoreError> {
        let (key1, key2) = joined
            .split_once(':')
            .filter(|(a, b)| !a.contains(':') && !b.contains(':'))
            .ok_or_else(|| CoreError::config("session key must be written key1:key2"))?;
        Ok(Self::SessionKey {
            key1: key1.trim().to_owned(),
            key2: key2.trim().to_owned(),
        })
    }

    fn basic_auth(&self) -> Option<BasicAuth> {
        match self {
            Self::Password { username, password } => {
                Some(BasicAuth::new(username.clone(), password.clone()))
            }
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::None => Ok(()),
            Self::Password { username, password } => {
                if username.trim().is_empty() {
                    return Err(CoreError::config("username is empty"));
                }
                if password.expose_secret().is_empty() {
                    return Err(CoreError::config("password is empty"));
                }
                Ok(())
            }
            Self::Token(token) => {
                if token.expose_secret().trim().is_empty() {
                    return Err(CoreError::config("token is empty"));
                }
                Ok(())
            }
            Self::SessionKey { .. } => self.session_key_bytes().map(|_| ()),
        }
    }
}

fn decode_half(half: &str, out: &mut [u8]) -> Result<(), hex::FromHexError> {
    let digits: Vec<u8> = half
        .bytes()
        .filter(|b| !matches!(b, b' ' | b'-'))
        .collect();
    hex::decode_to_slice(digits, out)
}

// ── SessionConfig ────────────────────────────────────────────────────

/// Everything a [`Session`](crate::Session) needs to reach one device.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label used in logs.
    pub name: String,
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    /// Device serial number, when the device requires one.
    pub serial: Option<String>,
    /// Bounded wait for correlated replies.
    pub request_timeout: Duration,
    /// Periodic refresh cadence. `None` disables polling.
    pub poll_interval: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            credentials: Credentials::None,
            serial: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: None,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check completeness before anything touches the network.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self.endpoint.host() {
            Some(host) if !host.trim().is_empty() => {}
            _ => return Err(CoreError::config("host is empty")),
        }
        if let Endpoint::Tcp { port: 0, .. } = self.endpoint {
            return Err(CoreError::config("port must be non-zero"));
        }
        if let Endpoint::WebSocket { url, .. } = &self.endpoint {
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(CoreError::config(format!(
                    "WebSocket url must use ws:// or wss://, got {}",
                    url.scheme()
                )));
            }
        }
        if let Endpoint::Http { url } = &self.endpoint {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(CoreError::config(format!(
                    "HTTP url must use http:// or https://, got {}",
                    url.scheme()
                )));
            }
        }

        self.credentials.validate()?;

        if let Some(serial) = &self.serial {
            if serial.trim().chars().count() <= 6 {
                return Err(CoreError::config("serial number must be longer than 6 characters"));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(CoreError::config("request timeout must be non-zero"));
        }
        if self.poll_interval.is_some_and(|d| d.is_zero()) {
            return Err(CoreError::config("poll interval must be non-zero"));
        }
        self.backoff.validate()
    }

    /// Build the transport described by `endpoint`.
    pub fn build_transport(&self) -> Box<dyn Transport> {
        let auth = self.credentials.basic_auth();
        match &self.endpoint {
            Endpoint::Tcp {
                host,
                port,
                framing,
            } => Box::new(TcpTransport::new(host.clone(), *port).with_framing(*framing)),
            Endpoint::WebSocket {
                url,
                subprotocol,
                origin,
            } => {
                let mut ws = WebSocketTransport::new(url.clone());
                if let Some(auth) = &auth {
                    ws = ws.with_basic_auth(auth);
                }
                if let Some(protocol) = subprotocol {
                    ws = ws.with_subprotocol(protocol.clone());
                }
                if let Some(origin) = origin {
                    ws = ws.with_origin(origin.clone());
                }
                Box::new(ws)
            }
            Endpoint::Http { url } => {
                let mut http = HttpTransport::new(url.clone()).with_timeout(self.request_timeout);
                if let Some(auth) = auth {
                    http = http.with_basic_auth(auth);
                }
                if let Some(interval) = self.poll_interval {
                    http = http.with_poll_interval(interval);
                }
                Box::new(http)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tcp(host: &str, port: u16) -> SessionConfig {
        SessionConfig::new(
            "panel",
            Endpoint::Tcp {
                host: host.into(),
                port,
                framing: Framing::Lines,
            },
        )
    }

    fn password(user: &str, pass: &str) -> Credentials {
        Credentials::Password {
            username: user.into(),
            password: SecretString::from(pass.to_string()),
        }
    }

    #[test]
    fn complete_config_validates() {
        let config = tcp("10.0.0.5", 4369).with_credentials(password("admin", "pw"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_host_is_config_error() {
        let err = tcp("  ", 4369).validate().unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn zero_port_rejected() {
        assert!(tcp("panel.local", 0).validate().is_err());
    }

    #[test]
    fn empty_password_rejected() {
        let config = tcp("panel.local", 4369).with_credentials(password("admin", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn session_key_decodes_both_halves() {
        let creds = Credentials::session_key(
            "00-11-22-33-44-55-66-77:88 99 aa bb cc dd ee ff",
        )
        .unwrap();
        let bytes = creds.session_key_bytes().unwrap();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[7], 0x77);
        assert_eq!(bytes[8], 0x88);
        assert_eq!(bytes[15], 0xff);
    }

    #[test]
    fn malformed_session_keys_rejected() {
        assert!(Credentials::session_key("0011223344556677").is_err());
        let short = Credentials::session_key("00112233:8899aabbccddeeff").unwrap();
        assert!(short.session_key_bytes().is_err());
        let not_hex = Credentials::session_key("001122334455667g:8899aabbccddeeff").unwrap();
        assert!(not_hex.session_key_bytes().is_err());
    }

    #[test]
    fn session_key_errors_name_the_bad_half() {
        let creds = Credentials::session_key("0011223344556677:8899aabbccddeezz").unwrap();
        let message = creds.session_key_bytes().unwrap_err().to_string();
        assert!(message.contains("key2"), "{message}");
        assert!(message.contains('z'), "{message}");

        let odd = Credentials::session_key("0011-2233-4455-667:8899aabbccddeeff").unwrap();
        let message = odd.session_key_bytes().unwrap_err().to_string();
        assert!(message.contains("key1"), "{message}");
    }

    #[test]
    fn short_serial_rejected() {
        let mut config = SessionConfig::new(
            "envoy",
            Endpoint::Http {
                url: Url::parse("http://envoy.local/api/v1/production/inverters").unwrap(),
            },
        )
        .with_credentials(password("envoy", "039315"));
        config.serial = Some("123456".into());
        assert!(config.validate().is_err());
        config.serial = Some("121603039315".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn websocket_scheme_checked() {
        let config = SessionConfig::new(
            "isy",
            Endpoint::WebSocket {
                url: Url::parse("http://isy.local/rest/subscribe").unwrap(),
                subprotocol: None,
                origin: None,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = tcp("panel.local", 4369).with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn transport_matches_endpoint() {
        let transport = tcp("10.0.0.5", 4369).build_transport();
        assert_eq!(transport.describe(), "tcp://10.0.0.5:4369");
    }
}
