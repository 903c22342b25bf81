//! Background cache warmer.
//!
//! Periodically refreshes every configured calendar so requests for busy
//! slugs rarely see stale data. The interval carries jitter to spread the
//! load on upstream servers, and slugs in failure backoff are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::cache::{Refreshed, RefreshOutcome};
use crate::error::AggregationResult;
use crate::service::Aggregator;

/// Warmer configuration.
#[derive(Debug, Clone)]
pub struct WarmerConfig {
    /// Time between rounds; zero disables periodic rounds.
    pub interval: Duration,
    /// Maximum jitter added to the interval (as fraction 0.0-1.0).
    pub jitter_fraction: f64,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            jitter_fraction: 0.1,
        }
    }
}

impl WarmerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: set jitter fraction.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Delay until the next round, or `None` when periodic rounds are off.
    pub fn next_delay(&self) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let base = self.interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Some(Duration::from_secs_f64((base + jitter).max(0.0)))
    }
}

/// Pseudo-random value in `[-range, range]` taken from the clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let fraction = (nanos as f64) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

/// Commands accepted by a running warmer.
#[derive(Debug, Clone)]
pub enum WarmerCommand {
    /// Run a round now.
    RefreshNow,
    /// Stop the warmer.
    Stop,
}

/// Result of one refresh round.
#[derive(Debug, Default)]
pub struct WarmReport {
    pub refreshed: Vec<(String, RefreshOutcome)>,
    pub failed: Vec<(String, String)>,
    /// Slugs skipped because they are backing off after failures.
    pub skipped: Vec<String>,
}

impl WarmReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Progress of a warmer.
#[derive(Debug, Clone, Default)]
pub struct WarmerState {
    pub rounds: u64,
    pub last_round: Option<DateTime<Utc>>,
    pub last_failures: usize,
}

/// Shared warmer state.
pub type SharedWarmerState = Arc<RwLock<WarmerState>>;

/// Refreshes every calendar of `aggregator` once and waits for the results.
pub async fn warm_all(aggregator: &Aggregator) -> WarmReport {
    let mut report = WarmReport::default();
    let mut pending = Vec::new();

    for slug in aggregator.directory().slugs() {
        let backing_off = aggregator
            .cache()
            .health(&slug)
            .is_some_and(|health| health.in_backoff());
        if backing_off {
            debug!(slug = %slug, "Skipping calendar in failure backoff");
            report.skipped.push(slug);
            continue;
        }
        match aggregator.refresh(&slug) {
            Ok(refresh) => pending.push((slug, refresh)),
            Err(err) => report.failed.push((slug, err.to_string())),
        }
    }

    let results: Vec<(String, AggregationResult<Refreshed>)> = join_all(
        pending
            .into_iter()
            .map(|(slug, refresh)| async move { (slug, refresh.wait().await) }),
    )
    .await;

    for (slug, result) in results {
        match result {
            Ok(refreshed) => report.refreshed.push((slug, refreshed.outcome)),
            Err(err) => report.failed.push((slug, err.to_string())),
        }
    }
    report
}

/// Periodic refresher driven by a command channel.
pub struct Warmer {
    config: WarmerConfig,
    aggregator: Aggregator,
    state: SharedWarmerState,
    command_tx: mpsc::Sender<WarmerCommand>,
    command_rx: mpsc::Receiver<WarmerCommand>,
}

impl Warmer {
    pub fn new(aggregator: Aggregator, config: WarmerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            aggregator,
            state: Arc::new(RwLock::new(WarmerState::default())),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands to the warmer.
    pub fn handle(&self) -> WarmerHandle {
        WarmerHandle {
            command_tx: self.command_tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Runs rounds until stopped. The first round starts immediately.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            enabled = self.config.is_enabled(),
            "Warmer started"
        );

        self.round().await;

        loop {
            let delay = self.config.next_delay();
            if let Some(delay) = delay {
                debug!(delay_secs = delay.as_secs(), "Scheduling next warm round");
            }
            let tick = async {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = tick => self.round().await,
                cmd = self.command_rx.recv() => match cmd {
                    Some(WarmerCommand::RefreshNow) => {
                        debug!("Received RefreshNow command");
                        self.round().await;
                    }
                    Some(WarmerCommand::Stop) | None => {
                        info!("Warmer stopping");
                        break;
                    }
                },
            }
        }
    }

    async fn round(&self) {
        let report = warm_all(&self.aggregator).await;
        if report.is_success() {
            debug!(
                refreshed = report.refreshed.len(),
                skipped = report.skipped.len(),
                "Warm round finished"
            );
        } else {
            warn!(
                refreshed = report.refreshed.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "Warm round finished with failures"
            );
        }

        let mut state = self.state.write().await;
        state.rounds += 1;
        state.last_round = Some(Utc::now());
        state.last_failures = report.failed.len();
    }
}

/// Handle for sending commands to a running warmer.
#[derive(Clone, Debug)]
pub struct WarmerHandle {
    command_tx: mpsc::Sender<WarmerCommand>,
    state: SharedWarmerState,
}

impl WarmerHandle {
    /// Triggers an immediate round.
    pub async fn refresh_now(&self) -> Result<(), mpsc::error::SendError<WarmerCommand>> {
        self.command_tx.send(WarmerCommand::RefreshNow).await
    }

    /// Stops the warmer.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<WarmerCommand>> {
        self.command_tx.send(WarmerCommand::Stop).await
    }

    pub async fn state(&self) -> WarmerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::service::AggregatorConfig;
    use calhub_core::{Calendar, Source};
    use calhub_feeds::{BoxFuture, FeedFetcher, FeedResult, RawDocument};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EMPTY: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl FeedFetcher for Counting {
        fn fetch<'a>(&'a self, source: &'a Source) -> BoxFuture<'a, FeedResult<RawDocument>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(RawDocument::new(source.clone(), EMPTY.as_bytes())) })
        }
    }

    fn aggregator(fetcher: Arc<Counting>) -> Aggregator {
        let directory = StaticDirectory::new([
            Calendar::new("parks", "Parks")
                .with_source(Source::new("https://a.example/a.ics").unwrap()),
            Calendar::new("library", "Library")
                .with_source(Source::new("https://b.example/b.ics").unwrap()),
        ]);
        Aggregator::new(Arc::new(directory), fetcher, AggregatorConfig::default())
    }

    #[test]
    fn disabled_config_has_no_delay() {
        assert!(!WarmerConfig::default().is_enabled());
        assert_eq!(WarmerConfig::default().next_delay(), None);
    }

    #[test]
    fn delay_stays_within_jitter() {
        let config = WarmerConfig::new(Duration::from_secs(100)).with_jitter(0.1);
        for _ in 0..20 {
            let delay = config.next_delay().unwrap();
            assert!(delay >= Duration::from_secs(90));
            assert!(delay <= Duration::from_secs(110));
        }
    }

    #[tokio::test]
    async fn warm_all_refreshes_every_calendar() {
        let fetcher = Arc::new(Counting::default());
        let aggregator = aggregator(Arc::clone(&fetcher));

        let report = warm_all(&aggregator).await;
        assert!(report.is_success());
        assert_eq!(report.refreshed.len(), 2);
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 2);
        assert_eq!(aggregator.cache().cached_slugs(), ["library", "parks"]);

        let report = warm_all(&aggregator).await;
        assert!(report
            .refreshed
            .iter()
            .all(|(_, outcome)| *outcome == RefreshOutcome::Unchanged));
    }

    #[tokio::test]
    async fn commands_drive_rounds() {
        let fetcher = Arc::new(Counting::default());
        let warmer = Warmer::new(aggregator(Arc::clone(&fetcher)), WarmerConfig::default());
        let handle = warmer.handle();
        let task = tokio::spawn(warmer.run());

        handle.refresh_now().await.unwrap();
        handle.stop().await.unwrap();
        task.await.unwrap();

        let state = handle.state().await;
        assert_eq!(state.rounds, 2);
        assert_eq!(state.last_failures, 0);
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 4);
    }
}
