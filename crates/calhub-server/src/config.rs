//! Configuration file model.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/calhub/config.toml`. Every section is optional:
//!
//! ```toml
//! [cache]
//! ttl_secs = 300
//!
//! [[calendars]]
//! name = "City Parks"
//!
//! [[calendars.sources]]
//! url = "webcal://parks.example.org/events.ics"
//! label = "Parks Department"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use calhub_core::{Calendar, Source, is_valid_slug, slugify};
use calhub_feeds::FetchConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheConfig;
use crate::directory::StaticDirectory;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::MergeConfig;
use crate::service::AggregatorConfig;
use crate::warmer::WarmerConfig;

/// Configuration for a CalendarHub process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub fetch: FetchSettings,
    pub cache: CacheSettings,
    pub window: WindowSettings,
    pub merge: MergeSettings,
    pub warmer: WarmerSettings,
    pub calendars: Vec<CalendarSettings>,
}

/// Upstream fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum response size in bytes.
    pub max_bytes: usize,
    /// Retries after the first attempt for timeouts and 5xx.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Process-wide concurrent request cap.
    pub max_in_flight: usize,
    /// Overrides the `User-Agent` header.
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let defaults = FetchConfig::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            max_bytes: defaults.max_bytes,
            max_retries: defaults.max_retries,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            max_in_flight: defaults.max_in_flight,
            user_agent: None,
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    /// How long a cold request waits for the first fetch.
    pub cold_wait_secs: u64,
    pub failure_backoff_secs: u64,
    pub max_failure_backoff_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            cold_wait_secs: 30,
            failure_backoff_secs: 5,
            max_failure_backoff_secs: 300,
        }
    }
}

/// Recurrence expansion window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub lookbehind_months: u32,
    pub lookahead_months: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            lookbehind_months: 1,
            lookahead_months: 12,
        }
    }
}

/// Merge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    /// Start difference under which two copies of a UID are one event.
    pub tolerance_ms: u64,
    /// Concurrent source fetches per calendar.
    pub per_calendar_fetches: usize,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            tolerance_ms: 1000,
            per_calendar_fetches: 4,
        }
    }
}

/// Background warmer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmerSettings {
    /// Seconds between rounds; 0 disables the warmer.
    pub interval_secs: u64,
    pub jitter_fraction: f64,
}

impl Default for WarmerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 0,
            jitter_fraction: 0.1,
        }
    }
}

/// One aggregated calendar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarSettings {
    /// Public identifier; derived from `name` when absent.
    pub slug: Option<String>,
    pub name: String,
    /// Display timezone for embeds.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

/// One upstream feed of a calendar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Overrides `fetch.timeout_secs` for this source.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl CalendarSettings {
    /// Configured slug, or one derived from the name.
    pub fn slug(&self) -> String {
        match &self.slug {
            Some(slug) => slug.trim().to_string(),
            None => slugify(&self.name),
        }
    }
}

impl HubConfig {
    /// Loads configuration from `path`, or from the default path when
    /// `None`. A missing default file yields the default configuration.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads and validates configuration from a specific path.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        debug!(
            path = %path.display(),
            calendars = config.calendars.len(),
            "Loaded config"
        );
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calhub")
    }

    /// Checks everything that would otherwise fail later at request time.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::invalid("cache.ttl_secs must be greater than 0"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch.timeout_secs must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.warmer.jitter_fraction) {
            return Err(ConfigError::invalid("warmer.jitter_fraction must be between 0 and 1"));
        }
        self.calendars().map(|_| ())
    }

    /// Builds the configured calendars.
    pub fn calendars(&self) -> ConfigResult<Vec<Calendar>> {
        let mut slugs = HashSet::new();
        let mut calendars = Vec::with_capacity(self.calendars.len());

        for settings in &self.calendars {
            let slug = settings.slug();
            if !is_valid_slug(&slug) {
                return Err(ConfigError::invalid(format!(
                    "calendar '{}': invalid slug '{slug}' (use lowercase letters, digits and single dashes)",
                    settings.name
                )));
            }
            if !slugs.insert(slug.clone()) {
                return Err(ConfigError::invalid(format!("duplicate calendar slug '{slug}'")));
            }

            let mut calendar = Calendar::new(&slug, settings.name.trim());
            if let Some(timezone) = settings.timezone.as_deref().map(str::trim)
                && !timezone.is_empty()
            {
                calendar = calendar.with_timezone(timezone);
            }

            let mut urls = HashSet::new();
            for source_settings in &settings.sources {
                let source = build_source(source_settings)
                    .map_err(|message| ConfigError::invalid(format!("calendar '{slug}': {message}")))?;
                if !urls.insert(source.url.to_string()) {
                    return Err(ConfigError::invalid(format!(
                        "calendar '{slug}': duplicate source URL '{}'",
                        source.url
                    )));
                }
                calendar = calendar.with_source(source);
            }
            calendars.push(calendar);
        }
        Ok(calendars)
    }

    /// Directory over the configured calendars.
    pub fn directory(&self) -> ConfigResult<StaticDirectory> {
        Ok(StaticDirectory::new(self.calendars()?))
    }

    pub fn fetch_config(&self) -> FetchConfig {
        let fetch = &self.fetch;
        let config = FetchConfig::default()
            .with_timeout(Duration::from_secs(fetch.timeout_secs))
            .with_max_bytes(fetch.max_bytes)
            .with_max_retries(fetch.max_retries)
            .with_backoff(
                Duration::from_millis(fetch.initial_backoff_ms),
                Duration::from_millis(fetch.max_backoff_ms),
            )
            .with_max_in_flight(fetch.max_in_flight);
        match &fetch.user_agent {
            Some(user_agent) => config.with_user_agent(user_agent),
            None => config,
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        let cache = CacheConfig::default()
            .with_ttl(Duration::from_secs(self.cache.ttl_secs))
            .with_failure_backoff(
                Duration::from_secs(self.cache.failure_backoff_secs),
                Duration::from_secs(self.cache.max_failure_backoff_secs),
            );
        let merge = MergeConfig::default()
            .with_tolerance(chrono::Duration::milliseconds(self.merge.tolerance_ms as i64));

        AggregatorConfig::default()
            .with_cache(cache)
            .with_merge(merge)
            .with_window(self.window.lookbehind_months, self.window.lookahead_months)
            .with_cold_wait(Duration::from_secs(self.cache.cold_wait_secs))
            .with_per_calendar_fetches(self.merge.per_calendar_fetches)
    }

    pub fn warmer_config(&self) -> WarmerConfig {
        WarmerConfig::new(Duration::from_secs(self.warmer.interval_secs))
            .with_jitter(self.warmer.jitter_fraction)
    }
}

fn build_source(settings: &SourceSettings) -> Result<Source, String> {
    let mut source = Source::new(settings.url.trim()).map_err(|e| e.to_string())?;
    if let Some(label) = &settings.label {
        source = source.with_label(label.trim());
    }
    match settings.timeout_secs {
        Some(0) => Err(format!("source '{}': timeout_secs must be greater than 0", settings.url)),
        Some(secs) => Ok(source.with_timeout(Duration::from_secs(secs))),
        None => Ok(source),
    }
}
