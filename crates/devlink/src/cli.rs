//! Clap derive structures for the `devlink` CLI.
//!
//! Defines the command tree, global flags, and shared value types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use devlink_core::{EntityKey, EntityKind};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devlink -- talk to home-automation controllers from the command line
#[derive(Debug, Parser)]
#[command(
    name = "devlink",
    version,
    about = "Monitor and command home-automation devices",
    long_about = "Connects to alarm panels, automation controllers and solar gateways \
        over TCP, WebSocket or HTTP,\nstreams their status events and sends correlated commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "DEVLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "DEVLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "json", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// How long to wait for the device to come online (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub connect_timeout: Option<Duration>,

    /// Reply timeout for correlated requests (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration, global = true)]
    pub timeout: Option<Duration>,

    /// Route entity-less records by a field, as KIND:FIELD (e.g. "inverter:serialNumber")
    #[arg(long, global = true)]
    pub records: Option<RecordRouting>,
}

// ── Shared value types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// `--records KIND:FIELD`
#[derive(Debug, Clone)]
pub struct RecordRouting {
    pub kind: EntityKind,
    pub field: String,
}

impl FromStr for RecordRouting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, field) = s
            .split_once(':')
            .ok_or_else(|| format!("expected KIND:FIELD, got '{s}'"))?;
        let kind = kind
            .parse()
            .map_err(|_| format!("unknown entity kind '{kind}'"))?;
        if field.trim().is_empty() {
            return Err("field name is empty".into());
        }
        Ok(Self {
            kind,
            field: field.trim().to_owned(),
        })
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream status changes and entity events as JSON lines
    #[command(alias = "watch")]
    Monitor(MonitorArgs),

    /// Send a command and print the correlated reply
    #[command(alias = "req")]
    Request(RequestArgs),

    /// Send a command without waiting for a reply
    Send(SendArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Device commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Only print events for these entities (kind:id, repeatable)
    #[arg(long = "entity", short = 'e')]
    pub entities: Vec<EntityKey>,

    /// Stop after this long (e.g. "30s"); default runs until Ctrl-C
    #[arg(long = "for", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Target entity (kind:id, e.g. "unit:7")
    pub entity: EntityKey,

    /// Action name understood by the device
    pub action: String,

    /// JSON arguments for the action
    #[arg(long)]
    pub args: Option<String>,

    /// Correlate by this id instead of by entity
    #[arg(long)]
    pub request_id: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target entity (kind:id)
    pub entity: EntityKey,

    /// Action name understood by the device
    pub action: String,

    /// JSON arguments for the action
    #[arg(long)]
    pub args: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the resolved configuration (secrets masked)
    Show,

    /// Check that the active profile is complete
    Validate,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a secret for the active profile in the system keyring (read from stdin)
    SetSecret {
        /// Which secret to store
        item: SecretKind,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SecretKind {
    Password,
    Token,
    SessionKey,
}

impl SecretKind {
    pub fn keyring_item(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Token => "token",
            Self::SessionKey => "session-key",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
