//! Merge engine, calendar cache and aggregation service.
//!
//! This crate is the aggregation core the HTTP layer calls into:
//! - [`MergeEngine`] - Deduplicates and orders events from several sources
//! - [`CalendarCache`] - Per-slug cache with TTL, stale-while-revalidate and
//!   refresh coalescing
//! - [`Aggregator`] - `get_calendar(slug)`, the single entry point
//! - [`Warmer`] - Optional periodic refresh of every calendar
//! - [`HubConfig`] - The `config.toml` model
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calhub_feeds::HttpFetcher;
//! use calhub_server::{Aggregator, HubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HubConfig::load(None)?;
//!     let aggregator = Aggregator::new(
//!         Arc::new(config.directory()?),
//!         Arc::new(HttpFetcher::new(config.fetch_config())?),
//!         config.aggregator_config(),
//!     );
//!
//!     let calendar = aggregator.get_calendar("city-parks").await?;
//!     println!("{}", calhub_core::to_ics(&calendar));
//!     Ok(())
//! }
//! ```

mod cache;
mod config;
mod directory;
mod error;
mod merge;
mod service;
mod warmer;

pub use cache::{
    CacheConfig, CacheEntry, CalendarCache, Freshness, Lookup, Refresh, RefreshHealth,
    RefreshOutcome, Refreshed, SharedRefresh,
};
pub use config::{
    CacheSettings, CalendarSettings, FetchSettings, HubConfig, MergeSettings, SourceSettings,
    WarmerSettings, WindowSettings,
};
pub use directory::{CalendarDirectory, StaticDirectory};
pub use error::{AggregationError, AggregationResult, ConfigError, ConfigResult, MergeError};
pub use merge::{MergeConfig, MergeEngine};
pub use service::{Aggregator, AggregatorConfig};
pub use warmer::{
    SharedWarmerState, WarmReport, Warmer, WarmerCommand, WarmerConfig, WarmerHandle,
    WarmerState, warm_all,
};
