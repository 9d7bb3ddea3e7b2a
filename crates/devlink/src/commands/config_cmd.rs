//! Config subcommand handlers.

use std::io::BufRead;

use serde_json::json;

use devlink_config::SystemKeyring;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{config_file, load_config, select_profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// First line of stdin, trimmed. Empty input is rejected.
fn read_secret(field: &str) -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let value = line.trim_end_matches(['\r', '\n']).to_owned();
    if value.is_empty() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "secret read from stdin is empty".into(),
        });
    }
    Ok(value)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => output::print_output(&config_file(global).display().to_string()),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = load_config(global)?;
            let rendered =
                toml::to_string_pretty(&cfg.redacted()).map_err(|e| CliError::Validation {
                    field: "config".into(),
                    reason: format!("failed to serialize config: {e}"),
                })?;
            output::print_output(rendered.trim_end())
        }

        // ── Validate ────────────────────────────────────────────────
        ConfigCommand::Validate => {
            let cfg = load_config(global)?;
            let (name, profile) = select_profile(&cfg, global)?;
            let session = devlink_config::profile_to_session_config(profile, &name, &cfg.defaults)?;
            let report = json!({
                "profile": name,
                "valid": true,
                "endpoint": session.endpoint.to_string(),
            });
            output::print_output(&output::render(global.output, &report)?)
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = load_config(global)?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured in {}", config_file(global).display());
            }
            for name in cfg.profiles.keys() {
                let marker = if name == default { " *" } else { "" };
                output::print_output(&format!("{name}{marker}"))?;
            }
            Ok(())
        }

        // ── Use <name> ──────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = load_config(global)?;
            if !cfg.profiles.contains_key(&name) {
                let available: Vec<_> = cfg.profiles.keys().cloned().collect();
                return Err(CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available.join(", ")
                    },
                    path: config_file(global).display().to_string(),
                });
            }
            cfg.default_profile = Some(name.clone());
            devlink_config::save_config_to(&cfg, &config_file(global))?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        // ── SetSecret ───────────────────────────────────────────────
        ConfigCommand::SetSecret { item } => {
            let cfg = load_config(global)?;
            let (name, _) = select_profile(&cfg, global)?;
            let value = read_secret(item.keyring_item())?;
            SystemKeyring.store(&name, item.keyring_item(), &value)?;
            eprintln!("Stored {} for profile '{name}' in the system keyring", item.keyring_item());
            Ok(())
        }
    }
}
