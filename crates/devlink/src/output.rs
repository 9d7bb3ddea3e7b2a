//! Output formatting: pretty or compact JSON on stdout.
//!
//! Logs go to stderr, so stdout stays machine-readable.

use std::io::{self, Write};

use serde::Serialize;
use serde_json::json;

use devlink_core::{Event, Status};

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render<T: Serialize + ?Sized>(format: OutputFormat, data: &T) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
    };
    Ok(rendered)
}

/// Print one rendered document followed by a newline and flush, so
/// streaming output reaches pipes immediately.
pub fn print_output(output: &str) -> Result<(), CliError> {
    if output.is_empty() {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{output}")?;
    stdout.flush()?;
    Ok(())
}

/// JSON line for a status transition.
pub fn status_line(status: &Status) -> serde_json::Value {
    json!({ "type": "status", "status": status })
}

/// JSON line for an entity event.
pub fn event_line<P: Serialize>(event: &Event<P>) -> serde_json::Value {
    json!({ "type": "event", "event": event })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use devlink_core::{EntityKey, EntityKind, OfflineReason, StatusDetail};

    use super::*;

    #[test]
    fn compact_json_is_one_line() {
        let out = render(OutputFormat::JsonCompact, &json!({ "a": [1, 2] })).unwrap();
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }

    #[test]
    fn event_line_carries_key_and_payload() {
        let event = Event::unsolicited(EntityKey::new(EntityKind::Zone, 3), json!({ "state": "open" }));
        let line = event_line(&event);
        assert_eq!(line["type"], "event");
        assert_eq!(line["event"]["key"], "zone:3");
        assert_eq!(line["event"]["payload"]["state"], "open");
    }

    #[test]
    fn status_line_flattens_offline_reason() {
        let status = Status::Offline(OfflineReason::new(StatusDetail::CommunicationError, "reset"));
        let line = status_line(&status);
        assert_eq!(line["status"]["status"], "offline");
        assert_eq!(line["status"]["detail"], "COMMUNICATION_ERROR");
    }
}
