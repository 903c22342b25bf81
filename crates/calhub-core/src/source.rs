//! Upstream feed definitions and the calendars that group them.
//!
//! A [`Calendar`] is the unit the rest of the system aggregates: a slug, a
//! display name and an ordered list of [`Source`]s. Declaration order is
//! significant, the first source listed has the highest priority when the
//! merge engine has to pick between duplicates.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::event::SourceTag;

/// Errors raised while building a [`Source`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// The URL could not be parsed.
    #[error("invalid source URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: url::ParseError },

    /// The URL uses a scheme we cannot fetch.
    #[error("unsupported URL scheme '{scheme}' (expected http, https or webcal)")]
    UnsupportedScheme { scheme: String },
}

/// An upstream iCalendar feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Feed URL (webcal URLs are rewritten to https).
    pub url: Url,
    /// Optional display label, shown as event attribution.
    pub label: Option<String>,
    /// Per-source fetch timeout overriding the fetcher default.
    pub timeout: Option<Duration>,
}

impl Source {
    /// Creates a source from a URL string.
    ///
    /// `webcal://` is accepted and mapped to `https://`, which is what every
    /// calendar client does with it.
    pub fn new(url: impl AsRef<str>) -> Result<Self, SourceError> {
        let raw = url.as_ref().trim();
        let normalized = match raw.get(..9) {
            Some(prefix) if prefix.eq_ignore_ascii_case("webcal://") => {
                format!("https://{}", &raw[9..])
            }
            _ => raw.to_string(),
        };

        let parsed = Url::parse(&normalized).map_err(|reason| SourceError::InvalidUrl {
            url: raw.to_string(),
            reason,
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self {
                url: parsed,
                label: None,
                timeout: None,
            }),
            other => Err(SourceError::UnsupportedScheme {
                scheme: other.to_string(),
            }),
        }
    }

    /// Sets the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = (!label.trim().is_empty()).then_some(label);
        self
    }

    /// Sets the per-source timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Label if configured, URL otherwise.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(self.url.as_str())
    }

    /// Builds the attribution tag carried by every event from this source.
    pub fn tag(&self, priority: usize) -> SourceTag {
        SourceTag {
            priority,
            url: self.url.to_string(),
            label: self.label.clone(),
        }
    }
}

/// A named aggregation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    /// Stable public identifier.
    pub slug: String,
    /// Human-readable name, used as the exported calendar name.
    pub name: String,
    /// Display timezone for embed rendering (IANA name).
    pub timezone: String,
    /// Upstream feeds in priority order.
    pub sources: Vec<Source>,
}

impl Calendar {
    /// Creates a calendar without sources.
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            timezone: "UTC".to_string(),
            sources: Vec::new(),
        }
    }

    /// Appends a source with the lowest priority so far.
    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the display timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Iterates sources together with their priority (0 is highest).
    pub fn prioritized_sources(&self) -> impl Iterator<Item = (usize, &Source)> {
        self.sources.iter().enumerate()
    }
}
