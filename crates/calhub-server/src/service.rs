//! Aggregation Service: slug in, merged calendar out.
//!
//! Fresh cache entries are returned as is. A stale entry is returned
//! immediately while a background refresh runs. A cold slug waits for the
//! first fetch-through for at most [`AggregatorConfig::cold_wait`]; giving up
//! does not cancel the refresh, which still lands in the cache.

use std::sync::Arc;
use std::time::Duration;

use calhub_core::{Calendar, MergedCalendar, Source, TimeWindow};
use calhub_feeds::{FeedFetcher, FeedResult, ParsedFeed, parse_document};
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt, stream};
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheConfig, CalendarCache, Freshness, Refresh};
use crate::directory::CalendarDirectory;
use crate::error::{AggregationError, AggregationResult};
use crate::merge::{MergeConfig, MergeEngine};

/// Aggregation settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub cache: CacheConfig,
    pub merge: MergeConfig,
    /// Months of history kept in the expansion window.
    pub lookbehind_months: u32,
    /// Months of future kept in the expansion window.
    pub lookahead_months: u32,
    /// How long a cold request waits for the first fetch-through.
    pub cold_wait: Duration,
    /// Concurrent source fetches per calendar.
    pub per_calendar_fetches: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            merge: MergeConfig::default(),
            lookbehind_months: 1,
            lookahead_months: 12,
            cold_wait: Duration::from_secs(30),
            per_calendar_fetches: 4,
        }
    }
}

impl AggregatorConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_merge(mut self, merge: MergeConfig) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_window(mut self, lookbehind_months: u32, lookahead_months: u32) -> Self {
        self.lookbehind_months = lookbehind_months;
        self.lookahead_months = lookahead_months;
        self
    }

    pub fn with_cold_wait(mut self, cold_wait: Duration) -> Self {
        self.cold_wait = cold_wait;
        self
    }

    pub fn with_per_calendar_fetches(mut self, fetches: usize) -> Self {
        self.per_calendar_fetches = fetches.max(1);
        self
    }

    /// Expansion window around now.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::around(Utc::now(), self.lookbehind_months, self.lookahead_months)
    }
}

/// The entry point the HTTP layer calls.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

struct Inner {
    directory: Arc<dyn CalendarDirectory>,
    fetcher: Arc<dyn FeedFetcher>,
    cache: CalendarCache,
    merge: MergeEngine,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(
        directory: Arc<dyn CalendarDirectory>,
        fetcher: Arc<dyn FeedFetcher>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                directory,
                fetcher,
                cache: CalendarCache::new(config.cache.clone()),
                merge: MergeEngine::new(config.merge),
                config,
            }),
        }
    }

    pub fn cache(&self) -> &CalendarCache {
        &self.inner.cache
    }

    pub fn directory(&self) -> &dyn CalendarDirectory {
        self.inner.directory.as_ref()
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// Returns the merged calendar for `slug`.
    #[tracing::instrument(skip(self))]
    pub async fn get_calendar(&self, slug: &str) -> AggregationResult<Arc<MergedCalendar>> {
        let calendar = self
            .inner
            .directory
            .calendar(slug)
            .ok_or_else(|| AggregationError::not_found(slug))?;

        let lookup = self.inner.cache.get(slug);
        match (lookup.calendar, lookup.freshness) {
            (Some(cached), Freshness::Fresh) => {
                trace!("Serving fresh calendar");
                return Ok(cached);
            }
            (Some(cached), _) => {
                if lookup.should_refresh {
                    debug!("Serving stale calendar, refreshing in background");
                    self.start_refresh(calendar);
                } else {
                    debug!(refreshing = lookup.refreshing, "Serving stale calendar");
                }
                return Ok(cached);
            }
            (None, _) => {}
        }

        if !lookup.refreshing
            && let Some(err) = lookup.backoff_error
        {
            debug!(error = %err, "Cold calendar is backing off after a failure");
            return Err(err);
        }

        let wait = self.inner.config.cold_wait;
        let refresh = self.start_refresh(calendar);
        match tokio::time::timeout(wait, refresh.wait()).await {
            Ok(result) => result.map(|refreshed| refreshed.calendar),
            Err(_) => {
                warn!(waited_ms = wait.as_millis() as u64, "Cold fetch still running, giving up on it");
                Err(AggregationError::timeout(slug, wait))
            }
        }
    }

    /// Starts a refresh of `slug` whatever its freshness, or joins the one
    /// in flight.
    pub fn refresh(&self, slug: &str) -> AggregationResult<Refresh> {
        let calendar = self
            .inner
            .directory
            .calendar(slug)
            .ok_or_else(|| AggregationError::not_found(slug))?;
        Ok(self.start_refresh(calendar))
    }

    /// Runs fetch, parse and merge for `slug` without touching the cache.
    pub async fn aggregate(&self, slug: &str) -> AggregationResult<MergedCalendar> {
        let calendar = self
            .inner
            .directory
            .calendar(slug)
            .ok_or_else(|| AggregationError::not_found(slug))?;
        self.inner.aggregate(&calendar).await
    }

    fn start_refresh(&self, calendar: Calendar) -> Refresh {
        let inner = Arc::clone(&self.inner);
        let slug = calendar.slug.clone();
        self.inner
            .cache
            .refresh(&slug, move || async move { inner.aggregate(&calendar).await })
    }
}

impl Inner {
    #[tracing::instrument(skip(self, calendar), fields(slug = %calendar.slug, sources = calendar.sources.len()))]
    async fn aggregate(&self, calendar: &Calendar) -> AggregationResult<MergedCalendar> {
        let window = self.config.window();
        let results = self.fetch_all(calendar, &window).await;

        let mut per_source = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        let mut failures = Vec::new();
        let mut feed_name = None;

        for (source, result) in results {
            match result {
                Ok(parsed) => {
                    if parsed.skipped > 0 {
                        debug!(source = %source.display_name(), skipped = parsed.skipped, "Source had unusable events");
                    }
                    feed_name = feed_name.or(parsed.calendar_name);
                    warnings.extend(parsed.warnings);
                    per_source.push(parsed.events);
                }
                Err(err) => {
                    warn!(source = %source.display_name(), error = %err, "Source failed, omitting its events");
                    let message = format!("{}: {}", source.display_name(), err);
                    warnings.push(message.clone());
                    failures.push(message);
                }
            }
        }

        if per_source.is_empty() && !failures.is_empty() {
            return Err(AggregationError::aggregation_failed(&calendar.slug, failures));
        }

        // The configured name wins; a feed's own name only fills a blank one.
        let named;
        let calendar = match feed_name {
            Some(name) if calendar.name.trim().is_empty() => {
                named = Calendar {
                    name,
                    ..calendar.clone()
                };
                &named
            }
            _ => calendar,
        };

        let merged = self.merge.merge(calendar, per_source, warnings)?;
        info!(
            events = merged.len(),
            warnings = merged.warnings.len(),
            failed_sources = failures.len(),
            "Aggregated calendar"
        );
        Ok(merged)
    }

    /// Fetches and parses every source with bounded concurrency. Results
    /// come back in declaration order; a slow source only holds its own
    /// slot in the fan-out.
    async fn fetch_all(
        &self,
        calendar: &Calendar,
        window: &TimeWindow,
    ) -> Vec<(Source, FeedResult<ParsedFeed>)> {
        let fetches: Vec<BoxFuture<'static, (usize, Source, FeedResult<ParsedFeed>)>> = calendar
            .prioritized_sources()
            .map(|(priority, source)| {
                let fetcher = Arc::clone(&self.fetcher);
                let source = source.clone();
                let window = *window;
                async move {
                    let tag = source.tag(priority);
                    let result = match fetcher.fetch(&source).await {
                        Ok(doc) => parse_document(&doc, &tag, &window),
                        Err(err) => Err(err),
                    };
                    (priority, source, result)
                }
                .boxed()
            })
            .collect();

        let mut results: Vec<_> = stream::iter(fetches)
            .buffer_unordered(self.config.per_calendar_fetches.max(1))
            .collect()
            .await;
        results.sort_by_key(|(priority, _, _)| *priority);
        results
            .into_iter()
            .map(|(_, source, result)| (source, result))
            .collect()
    }
}
