//! CLI argument parsing using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// calhub - merge public calendar feeds into one subscription.
#[derive(Debug, Parser)]
#[command(name = "calhub")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, short, env = "CALHUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log line layout (pretty, compact or json).
    #[arg(long, env = "CALHUB_LOG_FORMAT", default_value = "compact")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate a calendar and print it.
    Feed {
        /// Calendar slug.
        slug: String,

        /// Output format.
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Ics)]
        format: OutputFormat,

        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration and list the calendars it defines.
    Check,

    /// Refresh every configured calendar.
    Warm {
        /// Keep refreshing on the configured warmer interval until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
}

/// Rendering of an aggregated calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// iCalendar document.
    Ics,
    /// JSON event list.
    Json,
}
