//! CLI error types.

use calhub_core::TracingError;
use calhub_feeds::FeedError;
use calhub_server::{AggregationError, ConfigError};
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a `calhub` invocation.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("fetcher setup failed: {0}")]
    Fetcher(#[from] FeedError),

    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    #[error("failed to render calendar: {0}")]
    Render(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Some calendars could not be refreshed.
    #[error("{failed} of {total} calendars failed to refresh")]
    WarmFailed { failed: usize, total: usize },
}
