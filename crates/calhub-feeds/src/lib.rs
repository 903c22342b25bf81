//! Feed fetching and iCalendar parsing.
//!
//! This crate turns a [`Source`](calhub_core::Source) into normalized
//! [`Event`](calhub_core::Event) instances:
//!
//! - [`FeedFetcher`] - The fetch seam, implemented over HTTP by [`HttpFetcher`]
//! - [`RawDocument`] - A fetched body plus fetch metadata
//! - [`parse_document`] - iCalendar text to events inside a time window
//! - [`FeedError`] - Error type for one source
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────┐  fetch()   ┌─────────────┐  parse_document()  ┌────────────┐
//! │  Source  │ ─────────▶ │ RawDocument │ ─────────────────▶ │ ParsedFeed │
//! └──────────┘            └─────────────┘                    └────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use calhub_feeds::{FeedFetcher, HttpFetcher, parse_document};
//!
//! let fetcher = HttpFetcher::new(FetchConfig::default())?;
//! let doc = fetcher.fetch(&source).await?;
//! let parsed = parse_document(&doc, &source.tag(0), &window)?;
//! ```

pub mod document;
pub mod error;
pub mod fetcher;
pub mod parser;

pub use document::RawDocument;
pub use error::{FeedError, FeedErrorCode, FeedResult};
pub use fetcher::{BoxFuture, FeedFetcher, FetchConfig, HttpFetcher};
pub use parser::{ParsedFeed, parse_document, parse_ics};
