//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Follow a live football match analysis from the terminal
#[derive(Parser, Debug)]
#[command(name = "matchpulse")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (config, token, logs)
    #[arg(long, global = true, env = "MATCHPULSE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join an analysis job and stream its progress, events and tracking
    #[command(visible_alias = "w")]
    Watch(WatchArgs),

    /// Print the resolved configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Analysis job to follow
    pub job_id: String,

    /// Analysis service base URL (overrides config.toml)
    #[arg(long, env = "MATCHPULSE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Access token (overrides the token file)
    #[arg(long, env = "MATCHPULSE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Stop once the analysis completes
    #[arg(long)]
    pub exit_on_complete: bool,

    /// Seconds to wait before rejoining after a connection error (0 = give up)
    #[arg(long, default_value_t = 3)]
    pub retry_delay: u64,

    /// Keep only the first copy of events that share an id
    #[arg(long)]
    pub dedupe_events: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the defaults to config.toml if it does not exist yet
    #[arg(long)]
    pub init: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// One JSON snapshot per line
    Json,
}
