//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Event Publisher - batch publisher for observability events
#[derive(Parser, Debug)]
#[command(
    name = "event-publisher",
    author,
    version,
    about = "Batch publisher for observability events",
    long_about = "Reads newline-delimited JSON events, routes each event to a destination \n\
                  derived from its content, and publishes per-destination groups through \n\
                  the configured sender. Failed groups are retried; poison events are dropped."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_PUBLISHER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENT_PUBLISHER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish events from an NDJSON file or stdin
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "publisher.toml",
        env = "EVENT_PUBLISHER_CONFIG"
    )]
    pub config: PathBuf,

    /// NDJSON input file, one event per line (omit or `-` for stdin)
    #[arg(short, long, env = "EVENT_PUBLISHER_INPUT")]
    pub input: Option<PathBuf>,

    /// Override destination hosts from configuration (repeatable)
    #[arg(long = "host", env = "EVENT_PUBLISHER_HOSTS", value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Override the bearer token from configuration
    #[arg(long, env = "EVENT_PUBLISHER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Events per published batch
    #[arg(long, default_value = "100", env = "EVENT_PUBLISHER_BATCH_SIZE")]
    pub batch_size: usize,

    /// Publish attempts per batch after the first (0 = never retry)
    #[arg(long, default_value = "3", env = "EVENT_PUBLISHER_MAX_RETRIES")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds, multiplied by the attempt number
    #[arg(long, default_value = "500", env = "EVENT_PUBLISHER_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,

    /// Validate configuration and exit without publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "EVENT_PUBLISHER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "publisher.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "publisher.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show routing rules
    #[arg(long)]
    pub routing: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
