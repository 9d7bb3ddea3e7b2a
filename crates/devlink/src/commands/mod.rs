//! Command dispatch: bridges CLI args -> session operations -> output.

pub mod config_cmd;
pub mod monitor;
pub mod request;

use std::path::PathBuf;
use std::time::Duration;

use devlink_config::{Config, ConfigError, Profile};
use devlink_core::{JsonCodec, Session};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Config file in effect: `--config`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(devlink_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(devlink_config::load_config_from(&config_file(global))?)
}

/// Resolve the active profile, with a helpful error listing the
/// alternatives when it doesn't exist.
pub fn select_profile<'a>(
    cfg: &'a Config,
    global: &GlobalOpts,
) -> Result<(String, &'a Profile), CliError> {
    cfg.profile(global.profile.as_deref()).map_err(|err| match err {
        ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
            name,
            available: if cfg.profiles.is_empty() {
                "(none)".into()
            } else {
                cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            },
            path: config_file(global).display().to_string(),
        },
        other => other.into(),
    })
}

/// Build the session for the active profile plus the online wait.
fn build_session(global: &GlobalOpts) -> Result<(Session<JsonCodec>, Duration), CliError> {
    let cfg = load_config(global)?;
    let (name, profile) = select_profile(&cfg, global)?;

    let mut config = devlink_config::profile_to_session_config(profile, &name, &cfg.defaults)?;
    if let Some(timeout) = global.timeout {
        config = config.with_request_timeout(timeout);
    }

    let mut codec = JsonCodec::new();
    if let Some(records) = &global.records {
        codec = codec.with_bare_records(records.kind, records.field.clone());
    }

    let connect_timeout = global
        .connect_timeout
        .unwrap_or(cfg.defaults.connect_timeout);
    Ok((Session::new(config, codec), connect_timeout))
}

/// Connect and wait for the first attempt, bounded by `timeout`.
/// On failure the background retries are stopped before returning.
pub async fn bring_online(session: &Session<JsonCodec>, timeout: Duration) -> Result<(), CliError> {
    let err = match tokio::time::timeout(timeout, session.connect()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => CliError::from(e),
        Err(_) => CliError::Timeout {
            what: "Connecting".into(),
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        },
    };
    session.disconnect().await;
    Err(err)
}

/// Dispatch a device-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let (session, connect_timeout) = build_session(global)?;

    match cmd {
        Command::Monitor(args) => monitor::handle(&session, args, global).await,
        Command::Request(args) => {
            request::handle_request(&session, connect_timeout, args, global).await
        }
        Command::Send(args) => request::handle_send(&session, connect_timeout, args).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
