//! Feed Fetcher: retrieves raw calendar documents over HTTP.
//!
//! [`HttpFetcher`] enforces a per-request timeout and a body size limit,
//! retries timeouts and 5xx responses with exponential backoff, and caps the
//! number of requests in flight across the whole process. It remembers
//! `ETag`/`Last-Modified` per URL so unchanged feeds cost a `304`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use calhub_core::Source;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::document::RawDocument;
use crate::error::{FeedError, FeedResult};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Retrieves the raw document behind a [`Source`].
///
/// Implementations must be safe to call concurrently for different
/// sources; the aggregation pipeline fans out over a calendar's sources.
pub trait FeedFetcher: Send + Sync {
    fn fetch<'a>(&'a self, source: &'a Source) -> BoxFuture<'a, FeedResult<RawDocument>>;
}

/// Fetch policy.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Default per-request timeout, overridable per source.
    pub timeout: Duration,
    /// Maximum accepted body size in bytes.
    pub max_bytes: usize,
    /// Extra attempts after the first for retryable failures.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Process-wide cap on concurrent upstream requests.
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_bytes: 5 * 1024 * 1024,
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            backoff_multiplier: 2.0,
            max_in_flight: 16,
            user_agent: format!("CalendarHub/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.backoff_multiplier.powi(attempt as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Cache validators and the body they validate.
#[derive(Debug, Clone)]
struct Validators {
    etag: Option<String>,
    last_modified: Option<String>,
    body: Arc<[u8]>,
}

/// HTTP(S) implementation of [`FeedFetcher`].
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
    permits: Arc<Semaphore>,
    validators: Mutex<HashMap<String, Validators>>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> FeedResult<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| FeedError::connection(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
            validators: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches with retries on timeouts and 5xx responses.
    #[tracing::instrument(skip(self, source), fields(url = %source.url))]
    async fn fetch_with_retry(&self, source: &Source) -> FeedResult<RawDocument> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(source).await {
                Ok(doc) => {
                    debug!(
                        status = doc.status,
                        bytes = doc.len(),
                        not_modified = doc.not_modified,
                        "Fetched feed"
                    );
                    return Ok(doc);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Feed fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, source: &Source) -> FeedResult<RawDocument> {
        let url = source.url.as_str();
        // Held for the request only, not across backoff sleeps.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FeedError::connection("fetch limiter closed").with_url(url))?;

        let cached = self.cached_validators(url);
        let mut request = self
            .client
            .get(source.url.clone())
            .timeout(source.timeout.unwrap_or(self.config.timeout));
        if let Some(ref cached) = cached {
            if let Some(ref etag) = cached.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(ref last_modified) = cached.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        trace!(url = %url, conditional = cached.is_some(), "Sending feed request");
        let response = request
            .send()
            .await
            .map_err(|e| classify(&e).with_url(url))?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return match cached {
                Some(cached) => Ok(RawDocument::new(source.clone(), cached.body)
                    .with_status(status.as_u16())
                    .with_not_modified(true)),
                None => Err(FeedError::http(status.as_u16()).with_url(url)),
            };
        }
        if !status.is_success() {
            return Err(FeedError::http(status.as_u16()).with_url(url));
        }

        let etag = header_value(&response, ETAG);
        let last_modified = header_value(&response, LAST_MODIFIED);
        let body: Arc<[u8]> = self.read_body(response, url).await?.into();

        self.remember(url, etag, last_modified, body.clone());
        Ok(RawDocument::new(source.clone(), body).with_status(status.as_u16()))
    }

    async fn read_body(&self, mut response: Response, url: &str) -> FeedResult<Vec<u8>> {
        let limit = self.config.max_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(FeedError::too_large(limit).with_url(url));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify(&e).with_url(url))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FeedError::too_large(limit).with_url(url));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn cached_validators(&self, url: &str) -> Option<Validators> {
        self.validators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    fn remember(
        &self,
        url: &str,
        etag: Option<String>,
        last_modified: Option<String>,
        body: Arc<[u8]>,
    ) {
        let mut validators = self
            .validators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if etag.is_none() && last_modified.is_none() {
            validators.remove(url);
            return;
        }
        validators.insert(
            url.to_string(),
            Validators {
                etag,
                last_modified,
                body,
            },
        );
    }
}

impl FeedFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, source: &'a Source) -> BoxFuture<'a, FeedResult<RawDocument>> {
        Box::pin(self.fetch_with_retry(source))
    }
}

fn header_value(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn classify(err: &reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::timeout(format!("request timed out: {err}"))
    } else if err.is_builder() {
        FeedError::invalid_url(format!("cannot build request: {err}"))
    } else {
        FeedError::connection(format!("request failed: {err}"))
    }
}
