//! `request` and `send` handlers.

use std::time::Duration;

use serde_json::Value;

use devlink_core::{JsonCodec, JsonCommand, Session};

use crate::cli::{GlobalOpts, RequestArgs, SendArgs};
use crate::commands::bring_online;
use crate::error::CliError;
use crate::output;

fn parse_args(raw: Option<&str>) -> Result<Value, CliError> {
    raw.map_or(Ok(Value::Null), |raw| {
        serde_json::from_str(raw).map_err(|e| CliError::Validation {
            field: "--args".into(),
            reason: e.to_string(),
        })
    })
}

pub async fn handle_request(
    session: &Session<JsonCodec>,
    connect_timeout: Duration,
    args: RequestArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = JsonCommand::new(args.entity, args.action).with_args(parse_args(args.args.as_deref())?);
    let command = match args.request_id {
        Some(id) => command.with_request_id(id),
        None => command.expecting_reply(),
    };

    bring_online(session, connect_timeout).await?;
    let result = session.request(&command).await;
    session.disconnect().await;

    let reply = result?;
    output::print_output(&output::render(global.output, &*reply)?)
}

pub async fn handle_send(
    session: &Session<JsonCodec>,
    connect_timeout: Duration,
    args: SendArgs,
) -> Result<(), CliError> {
    let command = JsonCommand::new(args.entity, args.action).with_args(parse_args(args.args.as_deref())?);

    bring_online(session, connect_timeout).await?;
    let result = session.send(&command).await;
    session.disconnect().await;

    result?;
    tracing::info!(
        entity = %command.entity,
        action = %command.action,
        endpoint = %session.config().endpoint,
        "command sent"
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn args_must_be_json() {
        assert_eq!(parse_args(None).unwrap(), Value::Null);
        assert_eq!(parse_args(Some(r#"{"level":40}"#)).unwrap()["level"], 40);

        let err = parse_args(Some("{level")).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::USAGE);
    }
}
