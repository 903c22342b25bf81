//! Command-line front end for CalendarHub.
//!
//! This crate provides the `calhub` binary: it loads the configuration file,
//! sets up logging and drives the aggregation service from a terminal.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
