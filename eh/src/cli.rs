//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::DeviceId;

/// escapehub - presence and session hub for escape-room modules
#[derive(Parser)]
#[command(
    name = "eh",
    about = "Presence detection and session coordination for escape-room modules",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Write logs to the log file instead of stderr
    #[arg(long = "log-file", global = true)]
    pub log_file: bool,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the hub until interrupted
    Run {
        /// Listen address, overrides `transport.listen`
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Show the effective configuration
    Config {
        /// Validate only, print nothing on success
        #[arg(long)]
        check: bool,

        /// Output format
        #[arg(short, long, default_value = "yaml")]
        format: OutputFormat,
    },

    /// Show recorded hub events
    Events {
        /// Number of most recent events to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,

        /// Only events about this device
        #[arg(short, long)]
        device: Option<DeviceId>,

        /// Journal file (defaults to the hub's journal)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("escapehub")
        .join("logs")
        .join("escapehub.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text
pub fn generate_after_help() -> String {
    format!("Logs are written to stderr, or with --log-file to: {}\n", get_log_path().display())
}

/// Output format for the config command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: yaml or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}
