//! Subcommand implementations.

pub mod check;
pub mod feed;
pub mod warm;

use std::sync::Arc;

use calhub_feeds::HttpFetcher;
use calhub_server::{Aggregator, HubConfig};

use crate::error::CliResult;

/// Builds an aggregator over the configured calendars and the HTTP fetcher.
pub fn build_aggregator(config: &HubConfig) -> CliResult<Aggregator> {
    let directory = config.directory()?;
    let fetcher = HttpFetcher::new(config.fetch_config())?;
    Ok(Aggregator::new(
        Arc::new(directory),
        Arc::new(fetcher),
        config.aggregator_config(),
    ))
}
