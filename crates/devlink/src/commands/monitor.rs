//! `monitor`: stream status transitions and entity events as JSON lines.
//!
//! Keeps running across connection loss; the session reconnects with
//! backoff in the background and every transition is printed.

use std::collections::HashSet;

use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use devlink_core::{CoreError, EntityKey, JsonCodec, Session};

use crate::cli::{GlobalOpts, MonitorArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

fn emit(format: OutputFormat, line: &serde_json::Value) -> Result<(), CliError> {
    output::print_output(&output::render(format, line)?)
}

pub async fn handle(
    session: &Session<JsonCodec>,
    args: MonitorArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let format = match global.output {
        // one document per line
        OutputFormat::Json | OutputFormat::JsonCompact => OutputFormat::JsonCompact,
    };
    let filter: HashSet<EntityKey> = args.entities.into_iter().collect();

    let mut events = session.events();
    let mut status = session.status();

    match session.connect().await {
        Ok(()) => {}
        Err(e @ CoreError::Config { .. }) => return Err(e.into()),
        Err(e) => warn!(
            error = %e,
            endpoint = %session.config().endpoint,
            "initial connection failed, retrying in the background"
        ),
    }

    // Whatever the first attempt produced is already current.
    let initial = status.borrow_and_update().clone();
    if let Err(e) = emit(format, &output::status_line(&initial)) {
        session.disconnect().await;
        return Err(e);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match args.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Ok(()),
            () = &mut deadline => break Ok(()),
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                if let Err(e) = emit(format, &output::status_line(&current)) {
                    break Err(e);
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if !filter.is_empty() && !filter.contains(&event.key) {
                        continue;
                    }
                    if let Err(e) = emit(format, &output::event_line(&event)) {
                        break Err(e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "monitor fell behind, events dropped"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    session.disconnect().await;
    outcome
}
