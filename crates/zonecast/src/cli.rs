//! Clap derive structures for the `zonecast` CLI.
//!
//! Also compiled by build.rs for man page generation, so this file may only
//! depend on clap and clap_complete.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// zonecast -- watch live factory zone telemetry
#[derive(Debug, Parser)]
#[command(
    name = "zonecast",
    version,
    about = "Watch live factory zone telemetry from the command line",
    long_about = "Connects to a dashboard server's push streams and prints zone updates\n\
        as JSON lines. One shared stream carries every zone; dedicated\n\
        per-zone streams are available with --dedicated.",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "ZONECAST_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Dashboard server URL (overrides profile)
    #[arg(long, short = 's', env = "ZONECAST_SERVER", global = true)]
    pub server: Option<String>,

    /// Bearer token (overrides profile, env, and keyring)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "ZONECAST_INSECURE", global = true)]
    pub insecure: bool,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Emit logs as JSON
    #[arg(long, env = "ZONECAST_LOG_JSON", global = true)]
    pub log_json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress connection status output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream zone updates until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Inspect and manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Zone to watch (repeatable; all zones when omitted)
    #[arg(long = "zone", short = 'z', value_name = "ZONE")]
    pub zones: Vec<String>,

    /// Open one dedicated stream per zone instead of sharing the main stream
    #[arg(long, requires = "zones")]
    pub dedicated: bool,

    /// Print whole frames instead of one line per zone update
    #[arg(long)]
    pub raw: bool,

    /// Override the reconnect attempt limit
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Store a bearer token in the system keyring
    SetToken {
        /// Profile to store the token for (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
