//! Cache Layer: one merged calendar per slug with TTL and refresh coordination.
//!
//! Each slug owns a slot behind its own mutex, so unrelated slugs never
//! contend. A slot holds the cached entry, at most one in-flight refresh and
//! the refresh health. Expired entries stay servable until a refresh
//! replaces them; a failed refresh never touches the entry.
//!
//! ```text
//! Empty ──refresh ok──▶ Fresh ──ttl──▶ Stale ──refresh──▶ Stale+refreshing
//!                         ▲                                    │
//!                         └──────────────ok────────────────────┘
//! ```

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use calhub_core::MergedCalendar;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AggregationError, AggregationResult};

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a refreshed entry counts as fresh.
    pub ttl: Duration,
    /// Refresh suppression after the first consecutive failure.
    pub failure_backoff: Duration,
    /// Cap for the doubling failure backoff.
    pub max_failure_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            failure_backoff: Duration::from_secs(5),
            max_failure_backoff: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_failure_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.failure_backoff = initial;
        self.max_failure_backoff = max;
        self
    }

    /// Backoff after `failures` consecutive failures (1-based).
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.failure_backoff
            .saturating_mul(1 << shift)
            .min(self.max_failure_backoff)
    }
}

/// A cached merged calendar.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub calendar: Arc<MergedCalendar>,
    /// When the cached content was last confirmed by a refresh.
    pub refreshed_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(calendar: Arc<MergedCalendar>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            calendar,
            refreshed_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    fn extend_ttl(&mut self, ttl: Duration) {
        let now = Instant::now();
        self.refreshed_at = now;
        self.expires_at = now + ttl;
    }
}

/// Refresh bookkeeping for one slug.
#[derive(Debug, Clone, Default)]
pub struct RefreshHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<AggregationError>,
    backoff_until: Option<Instant>,
}

impl RefreshHealth {
    /// Whether refreshes are currently suppressed after failures.
    pub fn in_backoff(&self) -> bool {
        self.backoff_until.is_some_and(|until| Instant::now() < until)
    }

    fn record_success(&mut self) {
        let now = Utc::now();
        self.last_attempt = Some(now);
        self.last_success = Some(now);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.backoff_until = None;
    }

    fn record_failure(&mut self, error: AggregationError, config: &CacheConfig) {
        self.last_attempt = Some(Utc::now());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error);
        self.backoff_until = Some(Instant::now() + config.backoff_for(self.consecutive_failures));
    }
}

/// How a finished refresh changed the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// First result for the slug.
    Inserted,
    /// New content replaced the cached calendar.
    Replaced,
    /// Content was identical; only the expiry moved.
    Unchanged,
}

/// A successful refresh.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub calendar: Arc<MergedCalendar>,
    pub outcome: RefreshOutcome,
}

/// Future shared by every caller waiting on one refresh.
pub type SharedRefresh = Shared<BoxFuture<'static, AggregationResult<Refreshed>>>;

/// Handle on a started or joined refresh.
#[derive(Clone)]
pub struct Refresh {
    /// True when an in-flight refresh was joined instead of started.
    pub joined: bool,
    future: SharedRefresh,
}

impl Refresh {
    /// Waits for the refresh result.
    pub async fn wait(self) -> AggregationResult<Refreshed> {
        self.future.await
    }

    pub fn into_future(self) -> SharedRefresh {
        self.future
    }
}

/// Freshness of a slot at lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Missing,
    Fresh,
    Stale,
}

/// Result of [`CalendarCache::get`].
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Cached calendar, fresh or stale.
    pub calendar: Option<Arc<MergedCalendar>>,
    pub freshness: Freshness,
    /// A refresh is in flight for the slug.
    pub refreshing: bool,
    /// The caller should start a refresh.
    pub should_refresh: bool,
    /// Last failure while the slot is in backoff.
    pub backoff_error: Option<AggregationError>,
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<(u64, SharedRefresh)>,
    health: RefreshHealth,
    generation: u64,
}

/// Per-slug calendar cache.
pub struct CalendarCache {
    config: CacheConfig,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl Default for CalendarCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CalendarCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn slot(&self, slug: &str) -> Arc<Mutex<Slot>> {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(slug.to_string()).or_default())
    }

    fn existing_slot(&self, slug: &str) -> Option<Arc<Mutex<Slot>>> {
        lock(&self.slots).get(slug).cloned()
    }

    /// Returns the cached calendar regardless of freshness and whether a
    /// refresh should be started.
    pub fn get(&self, slug: &str) -> Lookup {
        let Some(slot) = self.existing_slot(slug) else {
            return Lookup {
                calendar: None,
                freshness: Freshness::Missing,
                refreshing: false,
                should_refresh: true,
                backoff_error: None,
            };
        };
        let slot = lock(&slot);

        let freshness = match &slot.entry {
            None => Freshness::Missing,
            Some(entry) if entry.is_expired() => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        };
        let refreshing = slot.in_flight.is_some();
        let in_backoff = slot.health.in_backoff();

        Lookup {
            calendar: slot.entry.as_ref().map(|e| Arc::clone(&e.calendar)),
            freshness,
            refreshing,
            should_refresh: freshness != Freshness::Fresh && !refreshing && !in_backoff,
            backoff_error: if in_backoff {
                slot.health.last_error.clone()
            } else {
                None
            },
        }
    }

    /// Starts a refresh with `producer`, or joins the one already in flight.
    ///
    /// The producer runs on its own task, so the result is stored even when
    /// every caller stops waiting.
    pub fn refresh<F, Fut>(&self, slug: &str, producer: F) -> Refresh
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AggregationResult<MergedCalendar>> + Send + 'static,
    {
        let slot = self.slot(slug);
        let mut guard = lock(&slot);

        if let Some((_, future)) = &guard.in_flight {
            debug!(slug = %slug, "Joining in-flight refresh");
            return Refresh {
                joined: true,
                future: future.clone(),
            };
        }

        guard.generation += 1;
        let generation = guard.generation;
        debug!(slug = %slug, generation, "Starting refresh");

        let task = {
            let slot = Arc::clone(&slot);
            let config = self.config.clone();
            let slug = slug.to_string();
            tokio::spawn(async move {
                let result = match AssertUnwindSafe(async move { producer().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AggregationError::refresh_aborted(&slug, "refresh task panicked")),
                };
                complete(&slot, &config, &slug, generation, result)
            })
        };

        let future = {
            let slot = Arc::clone(&slot);
            let slug = slug.to_string();
            async move {
                match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        clear_in_flight(&mut lock(&slot), generation);
                        Err(AggregationError::refresh_aborted(slug, err.to_string()))
                    }
                }
            }
            .boxed()
            .shared()
        };

        guard.in_flight = Some((generation, future.clone()));
        Refresh {
            joined: false,
            future,
        }
    }

    /// Refresh health of a slug, if it was ever refreshed.
    pub fn health(&self, slug: &str) -> Option<RefreshHealth> {
        self.existing_slot(slug).map(|slot| lock(&slot).health.clone())
    }

    /// Cached entry of a slug.
    pub fn entry(&self, slug: &str) -> Option<CacheEntry> {
        self.existing_slot(slug).and_then(|slot| lock(&slot).entry.clone())
    }

    /// Drops the cached entry of a slug. An in-flight refresh still lands.
    pub fn invalidate(&self, slug: &str) {
        if let Some(slot) = self.existing_slot(slug) {
            lock(&slot).entry = None;
            debug!(slug = %slug, "Invalidated cache entry");
        }
    }

    /// Slugs with a cached calendar.
    pub fn cached_slugs(&self) -> Vec<String> {
        let slots: Vec<_> = lock(&self.slots)
            .iter()
            .map(|(slug, slot)| (slug.clone(), Arc::clone(slot)))
            .collect();
        let mut slugs: Vec<_> = slots
            .into_iter()
            .filter(|(_, slot)| lock(slot).entry.is_some())
            .map(|(slug, _)| slug)
            .collect();
        slugs.sort();
        slugs
    }
}

/// Stores a refresh result in the slot and clears the in-flight marker.
fn complete(
    slot: &Mutex<Slot>,
    config: &CacheConfig,
    slug: &str,
    generation: u64,
    result: AggregationResult<MergedCalendar>,
) -> AggregationResult<Refreshed> {
    let mut slot = lock(slot);
    clear_in_flight(&mut slot, generation);

    let calendar = match result {
        Ok(calendar) => calendar,
        Err(err) => {
            slot.health.record_failure(err.clone(), config);
            warn!(
                slug = %slug,
                failures = slot.health.consecutive_failures,
                error = %err,
                "Refresh failed, keeping cached calendar"
            );
            return Err(err);
        }
    };
    slot.health.record_success();

    if let Some(entry) = slot.entry.as_mut()
        && entry.calendar.same_content(&calendar)
        && entry.calendar.warnings == calendar.warnings
    {
        entry.extend_ttl(config.ttl);
        debug!(slug = %slug, fingerprint = %calendar.fingerprint, "Refresh unchanged");
        return Ok(Refreshed {
            calendar: Arc::clone(&entry.calendar),
            outcome: RefreshOutcome::Unchanged,
        });
    }

    let outcome = if slot.entry.is_some() {
        RefreshOutcome::Replaced
    } else {
        RefreshOutcome::Inserted
    };
    let calendar = Arc::new(calendar);
    slot.entry = Some(CacheEntry::new(Arc::clone(&calendar), config.ttl));
    info!(
        slug = %slug,
        events = calendar.len(),
        fingerprint = %calendar.fingerprint,
        ?outcome,
        "Stored merged calendar"
    );

    Ok(Refreshed { calendar, outcome })
}

fn clear_in_flight(slot: &mut Slot, generation: u64) {
    if slot.in_flight.as_ref().is_some_and(|(g, _)| *g == generation) {
        slot.in_flight = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
