//! Profile configuration for devlink hosts.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `devlink_core::SessionConfig`. The CLI layers its
//! flag overrides on top of this.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use devlink_core::{
    BackoffPolicy, CoreError, Credentials, DEFAULT_REQUEST_TIMEOUT, Endpoint, Framing,
    SessionConfig,
};

/// Keyring service all devlink secrets are stored under.
pub const KEYRING_SERVICE: &str = "devlink";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "DEVLINK_CONFIG";

/// Port used for `tcp` profiles that don't set one.
pub const DEFAULT_TCP_PORT: u16 = 4369;

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("profile '{profile}' is incomplete: {source}")]
    Incomplete {
        profile: String,
        #[source]
        source: CoreError,
    },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Tuning shared by every profile. Durations are written the humantime
/// way (`"5s"`, `"2m 30s"`); a bare integer means seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,

    /// How long hosts wait for a session to come online.
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,

    #[serde(default = "default_backoff_floor", with = "duration")]
    pub backoff_floor: Duration,

    #[serde(default = "default_backoff_ceiling", with = "duration")]
    pub backoff_ceiling: Duration,

    #[serde(default)]
    pub jitter: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            backoff_floor: default_backoff_floor(),
            backoff_ceiling: default_backoff_ceiling(),
            jitter: false,
        }
    }
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_backoff_floor() -> Duration {
    BackoffPolicy::default().floor
}
fn default_backoff_ceiling() -> Duration {
    BackoffPolicy::default().ceiling
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Websocket,
    Http,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingKind {
    #[default]
    Lines,
    LengthDelimited,
}

impl From<FramingKind> for Framing {
    fn from(kind: FramingKind) -> Self {
        match kind {
            FramingKind::Lines => Self::Lines,
            FramingKind::LengthDelimited => Self::LengthDelimited,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    #[default]
    None,
    Password,
    Token,
    SessionKey,
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub transport: TransportKind,

    /// Device host for `tcp` profiles.
    pub host: Option<String>,

    /// Device port for `tcp` profiles (default 4369).
    pub port: Option<u16>,

    #[serde(default)]
    pub framing: FramingKind,

    /// Device URL for `websocket` and `http` profiles.
    pub url: Option<String>,

    /// WebSocket subprotocol requested on upgrade.
    pub subprotocol: Option<String>,

    /// `Origin` header sent on WebSocket upgrade.
    pub origin: Option<String>,

    #[serde(default)]
    pub auth: AuthMode,

    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Bearer token (plaintext -- prefer keyring or env var).
    pub token: Option<String>,

    pub token_env: Option<String>,

    /// Session key as `key1:key2` (plaintext -- prefer keyring).
    pub session_key: Option<String>,

    pub session_key_env: Option<String>,

    /// Device serial number, for devices that need one.
    pub serial: Option<String>,

    /// Override `defaults.request_timeout`.
    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,

    /// Periodic refresh; unset disables polling.
    #[serde(default, with = "duration::option", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$DEVLINK_CONFIG`, else the platform
/// config directory.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    ProjectDirs::from("rs", "devlink", "devlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("devlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file is fine) layered with `DEVLINK_*`
/// environment overrides. Nested keys use `__`, e.g.
/// `DEVLINK_DEFAULTS__REQUEST_TIMEOUT=10s`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEVLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile selection ───────────────────────────────────────────────

impl Config {
    /// Pick `name`, else `default_profile`, else `"default"`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::UnknownProfile { name }),
        }
    }

    /// Copy with every plaintext secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        for profile in out.profiles.values_mut() {
            for secret in [
                &mut profile.password,
                &mut profile.token,
                &mut profile.session_key,
            ] {
                if secret.is_some() {
                    *secret = Some(REDACTED.into());
                }
            }
        }
        out
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Where stored secrets are looked up between env vars and plaintext.
pub trait SecretStore {
    /// Secret `item` (e.g. `"password"`) for `profile`, if stored.
    fn secret(&self, profile: &str, item: &str) -> Option<String>;
}

/// The platform keyring, under service [`KEYRING_SERVICE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemKeyring;

impl SystemKeyring {
    /// Save `value` as secret `item` for `profile`.
    pub fn store(&self, profile: &str, item: &str, value: &str) -> Result<(), ConfigError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile}/{item}"))?;
        entry.set_password(value)?;
        debug!(profile, item, "secret stored in keyring");
        Ok(())
    }
}

impl SecretStore for SystemKeyring {
    fn secret(&self, profile: &str, item: &str) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile}/{item}")).ok()?;
        entry.get_password().ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum SecretItem {
    Password,
    Token,
    SessionKey,
}

impl SecretItem {
    fn keyring_item(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Token => "token",
            Self::SessionKey => "session-key",
        }
    }

    fn global_env(self) -> &'static str {
        match self {
            Self::Password => "DEVLINK_PASSWORD",
            Self::Token => "DEVLINK_TOKEN",
            Self::SessionKey => "DEVLINK_SESSION_KEY",
        }
    }

    fn profile_env(self, profile: &Profile) -> Option<&str> {
        match self {
            Self::Password => profile.password_env.as_deref(),
            Self::Token => profile.token_env.as_deref(),
            Self::SessionKey => profile.session_key_env.as_deref(),
        }
    }

    fn plaintext(self, profile: &Profile) -> Option<&str> {
        match self {
            Self::Password => profile.password.as_deref(),
            Self::Token => profile.token.as_deref(),
            Self::SessionKey => profile.session_key.as_deref(),
        }
    }
}

fn resolve_secret(
    profile: &Profile,
    profile_name: &str,
    item: SecretItem,
    store: &dyn SecretStore,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's own env var, then the global one
    let from_env = item
        .profile_env(profile)
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| std::env::var(item.global_env()).ok());
    if let Some(value) = from_env {
        return Ok(SecretString::from(value));
    }

    // 2. Keyring
    if let Some(value) = store.secret(profile_name, item.keyring_item()) {
        return Ok(SecretString::from(value));
    }

    // 3. Plaintext in config
    if let Some(value) = item.plaintext(profile) {
        return Ok(SecretString::from(value.to_owned()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve a profile's credentials from env, `store`, then plaintext.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
    store: &dyn SecretStore,
) -> Result<Credentials, ConfigError> {
    match profile.auth {
        AuthMode::None => Ok(Credentials::None),
        AuthMode::Password => {
            let username = profile
                .username
                .clone()
                .or_else(|| std::env::var("DEVLINK_USERNAME").ok())
                .ok_or_else(|| ConfigError::NoCredentials {
                    profile: profile_name.into(),
                })?;
            let password = resolve_secret(profile, profile_name, SecretItem::Password, store)?;
            Ok(Credentials::Password { username, password })
        }
        AuthMode::Token => {
            let token = resolve_secret(profile, profile_name, SecretItem::Token, store)?;
            Ok(Credentials::Token(token))
        }
        AuthMode::SessionKey => {
            let joined = resolve_secret(profile, profile_name, SecretItem::SessionKey, store)?;
            Credentials::session_key(joined.expose_secret()).map_err(|source| {
                ConfigError::Incomplete {
                    profile: profile_name.into(),
                    source,
                }
            })
        }
    }
}

// ── SessionConfig translation ───────────────────────────────────────

fn parse_url(profile: &Profile) -> Result<url::Url, ConfigError> {
    let raw = profile
        .url
        .as_deref()
        .ok_or_else(|| invalid("url", "required for websocket and http profiles"))?;
    raw.parse()
        .map_err(|_| invalid("url", format!("invalid URL: {raw}")))
}

fn endpoint(profile: &Profile) -> Result<Endpoint, ConfigError> {
    match profile.transport {
        TransportKind::Tcp => {
            let host = profile
                .host
                .clone()
                .ok_or_else(|| invalid("host", "required for tcp profiles"))?;
            Ok(Endpoint::Tcp {
                host,
                port: profile.port.unwrap_or(DEFAULT_TCP_PORT),
                framing: profile.framing.into(),
            })
        }
        TransportKind::Websocket => Ok(Endpoint::WebSocket {
            url: parse_url(profile)?,
            subprotocol: profile.subprotocol.clone(),
            origin: profile.origin.clone(),
        }),
        TransportKind::Http => Ok(Endpoint::Http {
            url: parse_url(profile)?,
        }),
    }
}

/// Build a validated `SessionConfig` from a profile, resolving secrets
/// through the system keyring.
pub fn profile_to_session_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    session_config_with(profile, profile_name, defaults, &SystemKeyring)
}

/// [`profile_to_session_config`] with an explicit secret store.
pub fn session_config_with(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    store: &dyn SecretStore,
) -> Result<SessionConfig, ConfigError> {
    let mut config = SessionConfig::new(profile_name, endpoint(profile)?)
        .with_credentials(resolve_credentials(profile, profile_name, store)?)
        .with_request_timeout(profile.request_timeout.unwrap_or(defaults.request_timeout))
        .with_backoff(BackoffPolicy {
            floor: defaults.backoff_floor,
            ceiling: defaults.backoff_ceiling,
            jitter: defaults.jitter,
        });
    if let Some(interval) = profile.poll_interval {
        config = config.with_poll_interval(interval);
    }
    config.serial.clone_from(&profile.serial);

    config
        .validate()
        .map_err(|source| ConfigError::Incomplete {
            profile: profile_name.into(),
            source,
        })?;
    Ok(config)
}

// ── humantime durations ─────────────────────────────────────────────

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(D::Error::custom),
        }
    }

    pub(super) mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub(crate) fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(with = "super")] Duration);

            let wrapped: Option<Wrapper> = Option::deserialize(deserializer)?;
            Ok(wrapped.map(|Wrapper(d)| d))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;
    use devlink_core::ErrorClass;

    #[derive(Default)]
    struct FakeKeyring(HashMap<String, String>);

    impl FakeKeyring {
        fn with(mut self, key: &str, value: &str) -> Self {
            self.0.insert(key.into(), value.into());
            self
        }
    }

    impl SecretStore for FakeKeyring {
        fn secret(&self, profile: &str, item: &str) -> Option<String> {
            self.0.get(&format!("{profile}/{item}")).cloned()
        }
    }

    const SAMPLE: &str = r#"
        default_profile = "panel"

        [defaults]
        request_timeout = "3s"
        backoff_ceiling = "2m"

        [profiles.panel]
        host = "10.0.0.5"
        auth = "session-key"
        session_key = "00112233-44556677:8899AABB-CCDDEEFF"
        poll_interval = "30s"

        [profiles.envoy]
        transport = "http"
        url = "http://envoy.local/api/v1/production/inverters"
        auth = "password"
        username = "envoy"
        password = "123456"
        serial = "121234567890"
        request_timeout = 20

        [profiles.isy]
        transport = "websocket"
        url = "ws://isy.local/rest/subscribe"
        subprotocol = "ISYSUB"
        origin = "com.universal-devices.websockets.isy"
        auth = "password"
        username = "admin"
        password_env = "ISY_PASSWORD"
    "#;

    #[test]
    fn loads_profiles_and_humantime_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("devlink.toml", SAMPLE)?;
            let cfg = load_config_from(Path::new("devlink.toml")).map_err(|e| e.to_string())?;

            assert_eq!(cfg.default_profile.as_deref(), Some("panel"));
            assert_eq!(cfg.defaults.request_timeout, Duration::from_secs(3));
            assert_eq!(cfg.defaults.backoff_ceiling, Duration::from_secs(120));
            assert_eq!(cfg.defaults.backoff_floor, Duration::from_secs(1));
            assert_eq!(cfg.profiles.len(), 3);
            assert_eq!(
                cfg.profiles["panel"].poll_interval,
                Some(Duration::from_secs(30))
            );
            assert_eq!(
                cfg.profiles["envoy"].request_timeout,
                Some(Duration::from_secs(20))
            );
            assert_eq!(cfg.profiles["isy"].transport, TransportKind::Websocket);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("devlink.toml", SAMPLE)?;
            jail.set_env("DEVLINK_DEFAULTS__REQUEST_TIMEOUT", "9s");
            jail.set_env("DEVLINK_DEFAULT_PROFILE", "envoy");

            let cfg = load_config_from(Path::new("devlink.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.defaults.request_timeout, Duration::from_secs(9));
            assert_eq!(cfg.profile(None).map_err(|e| e.to_string())?.0, "envoy");
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.default_profile.as_deref(), Some("default"));
            assert_eq!(cfg.defaults, Defaults::default());
            assert!(cfg.profiles.is_empty());
            Ok(())
        });
    }

    #[test]
    fn profile_selection() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.profile(None).unwrap().0, "panel");
        assert_eq!(cfg.profile(Some("isy")).unwrap().0, "isy");
        assert!(matches!(
            cfg.profile(Some("garage")),
            Err(ConfigError::UnknownProfile { name }) if name == "garage"
        ));
    }

    #[test]
    fn session_key_profile_translates_to_tcp_session() {
        Jail::expect_with(|_| {
            let cfg: Config = toml::from_str(SAMPLE).unwrap();
            let (name, profile) = cfg.profile(None).unwrap();
            let session =
                session_config_with(profile, &name, &cfg.defaults, &FakeKeyring::default()).unwrap();

            assert!(matches!(
                &session.endpoint,
                Endpoint::Tcp { host, port: DEFAULT_TCP_PORT, framing: Framing::Lines } if host == "10.0.0.5"
            ));
            assert_eq!(
                session.credentials.session_key_bytes().unwrap(),
                [
                    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC,
                    0xDD, 0xEE, 0xFF
                ]
            );
            assert_eq!(session.request_timeout, Duration::from_secs(3));
            assert_eq!(session.poll_interval, Some(Duration::from_secs(30)));
            assert_eq!(session.backoff.ceiling, Duration::from_secs(120));
            Ok(())
        });
    }

    #[test]
    fn secrets_prefer_env_then_keyring_then_plaintext() {
        Jail::expect_with(|jail| {
            let cfg: Config = toml::from_str(SAMPLE).unwrap();
            let envoy = &cfg.profiles["envoy"];
            let password = |store: &FakeKeyring| match resolve_credentials(envoy, "envoy", store)
                .unwrap()
            {
                Credentials::Password { password, .. } => password.expose_secret().to_owned(),
                other => panic!("unexpected credentials {other:?}"),
            };

            assert_eq!(password(&FakeKeyring::default()), "123456");

            let keyring = FakeKeyring::default().with("envoy/password", "from-keyring");
            assert_eq!(password(&keyring), "from-keyring");

            jail.set_env("DEVLINK_PASSWORD", "from-env");
            assert_eq!(password(&keyring), "from-env");
            Ok(())
        });
    }

    #[test]
    fn profile_env_var_names_the_secret() {
        Jail::expect_with(|jail| {
            let cfg: Config = toml::from_str(SAMPLE).unwrap();
            let isy = &cfg.profiles["isy"];

            let err = resolve_credentials(isy, "isy", &FakeKeyring::default()).unwrap_err();
            assert!(matches!(err, ConfigError::NoCredentials { .. }));

            jail.set_env("ISY_PASSWORD", "hunter2");
            let session =
                session_config_with(isy, "isy", &cfg.defaults, &FakeKeyring::default()).unwrap();
            assert!(matches!(
                &session.endpoint,
                Endpoint::WebSocket { subprotocol: Some(p), .. } if p == "ISYSUB"
            ));
            Ok(())
        });
    }

    #[test]
    fn incomplete_profiles_are_rejected_before_connecting() {
        Jail::expect_with(|_| {
            let short_serial = Profile {
                transport: TransportKind::Http,
                url: Some("http://envoy.local/".into()),
                serial: Some("12345".into()),
                ..Profile::default()
            };
            let err = session_config_with(
                &short_serial,
                "envoy",
                &Defaults::default(),
                &FakeKeyring::default(),
            )
            .unwrap_err();
            let ConfigError::Incomplete { source, .. } = err else {
                panic!("expected an incomplete-profile error");
            };
            assert_eq!(source.class(), ErrorClass::Configuration);

            let no_host = Profile::default();
            let err =
                session_config_with(&no_host, "x", &Defaults::default(), &FakeKeyring::default())
                    .unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "host"));

            let bad_key = Profile {
                host: Some("panel".into()),
                auth: AuthMode::SessionKey,
                session_key: Some("0011".into()),
                ..Profile::default()
            };
            let err =
                session_config_with(&bad_key, "x", &Defaults::default(), &FakeKeyring::default())
                    .unwrap_err();
            assert!(matches!(err, ConfigError::Incomplete { .. }));
            Ok(())
        });
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                host: Some("192.168.1.20".into()),
                port: Some(4370),
                framing: FramingKind::LengthDelimited,
                poll_interval: Some(Duration::from_secs(90)),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("poll_interval = \"1m 30s\""));
        assert!(written.contains("framing = \"length-delimited\""));

        let loaded: Config = toml::from_str(&written).unwrap();
        let profile = &loaded.profiles["default"];
        assert_eq!(profile.port, Some(4370));
        assert_eq!(profile.poll_interval, Some(Duration::from_secs(90)));
    }

    #[test]
    fn redaction_masks_plaintext_secrets() {
        let cfg: Config = toml::from_str(SAMPLE).unwrap();
        let shown = cfg.redacted();
        assert_eq!(shown.profiles["envoy"].password.as_deref(), Some(REDACTED));
        assert_eq!(shown.profiles["panel"].session_key.as_deref(), Some(REDACTED));
        assert_eq!(shown.profiles["isy"].password, None);
        assert_eq!(shown.profiles["envoy"].username.as_deref(), Some("envoy"));
    }
}
