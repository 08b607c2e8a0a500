//! Clap derive structures for the `tahoma` CLI.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tahoma -- drive Somfy TaHoma devices through the Overkiz cloud
#[derive(Debug, Parser)]
#[command(
    name = "tahoma",
    version,
    about = "Control TaHoma devices from the command line",
    long_about = "List, query and command devices attached to a Somfy TaHoma box\n\
        through the Overkiz end-user cloud API.",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "TAHOMA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account e-mail (overrides profile)
    #[arg(long, short = 'u', env = "TAHOMA_USER", global = true)]
    pub user: Option<String>,

    /// API root URL (overrides profile)
    #[arg(long, env = "TAHOMA_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TAHOMA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "TAHOMA_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "TAHOMA_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Refresh states and list devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Submit a command to one device
    #[command(alias = "x")]
    Exec(ExecArgs),

    /// Query one state of a device
    State(StateArgs),

    /// Cancel a running execution
    Cancel(CancelArgs),

    /// Print connection events until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Only devices whose label contains this text (case-insensitive)
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Include current states in the output
    #[arg(long, short = 's')]
    pub states: bool,
}

// ── Exec ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Command name (e.g. open, close, setClosure)
    pub command: String,

    /// Command parameters; JSON literals are sent as-is, anything else as a string
    pub params: Vec<String>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Wait up to this long for the execution to finish (e.g. 30s, 2m)
    #[arg(long, short = 'w', value_parser = humantime::parse_duration)]
    pub wait: Option<Duration>,
}

/// Which device a command targets.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct TargetArgs {
    /// Device URL (e.g. io://1234-5678-9012/12345678)
    #[arg(long)]
    pub url: Option<String>,

    /// Device label, resolved through a refresh
    #[arg(long, short = 'l')]
    pub label: Option<String>,
}

// ── State / Cancel ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StateArgs {
    /// Device URL
    pub url: String,

    /// State name (e.g. core:ClosureState)
    pub name: String,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Execution id returned by `exec`
    pub exec_id: String,
}

// ── Watch ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print device events for this device URL
    #[arg(long)]
    pub url: Option<String>,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g. user, base_url, event_period)
        key: String,

        /// Value to set
        value: String,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the active profile's password in the system keyring
    SetPassword,
}

// ── Completions ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
