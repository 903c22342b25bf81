//! Normalized event instances.
//!
//! Every event produced by the parser is a concrete instance: recurring
//! series are expanded before they reach this type, and all instants are
//! stored in UTC. All-day events keep `all_day = true` with their start and
//! end at UTC midnight, end exclusive.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when the upstream event has no SUMMARY.
pub const UNTITLED: &str = "(No title)";

/// Attribution of an event to the source it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceTag {
    /// Position of the source in its calendar (0 is highest priority).
    pub priority: usize,
    /// Source URL.
    pub url: String,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SourceTag {
    /// Label if configured, URL otherwise.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.url)
    }
}

/// A single normalized event instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier unique within a merged calendar.
    pub id: String,
    /// Upstream UID (shared by every instance of a series).
    pub uid: String,
    /// Event title.
    pub title: String,
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant, never before `start`.
    pub end: DateTime<Utc>,
    /// Whether this is a date-only event.
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Original start of the instance within its series, if recurring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<DateTime<Utc>>,
    /// Source this instance was read from.
    pub source: SourceTag,
}

impl Event {
    /// Creates a timed event. A blank title is replaced by [`UNTITLED`].
    pub fn new(
        uid: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: SourceTag,
    ) -> Self {
        let uid = uid.into();
        let title = title.into();
        let title = if title.trim().is_empty() {
            UNTITLED.to_string()
        } else {
            title
        };
        Self {
            id: instance_id(source.priority, &uid, start),
            uid,
            title,
            start,
            end,
            all_day: false,
            location: None,
            description: None,
            url: None,
            recurrence_id: None,
            source,
        }
    }

    /// Creates an all-day event spanning `[start, end)` in whole days.
    pub fn all_day(
        uid: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        source: SourceTag,
    ) -> Self {
        let mut event = Self::new(uid, title, midnight(start), midnight(end), source);
        event.all_day = true;
        event
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = non_blank(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_blank(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = non_blank(url.into());
        self
    }

    pub fn with_recurrence_id(mut self, recurrence_id: DateTime<Utc>) -> Self {
        self.recurrence_id = Some(recurrence_id);
        self
    }

    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    /// Case-insensitive UID used for duplicate detection.
    pub fn uid_key(&self) -> String {
        self.uid.trim().to_lowercase()
    }

    /// Length of the event.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// First calendar day of the event (UTC).
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Exclusive end day of an all-day event, or the end's UTC date.
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    /// Whether start and end are consistent.
    pub fn is_well_formed(&self) -> bool {
        self.start <= self.end
    }
}

/// Builds the instance identifier: source priority, UID and start instant.
pub fn instance_id(priority: usize, uid: &str, start: DateTime<Utc>) -> String {
    format!("{priority}:{uid}@{}", start.format("%Y%m%dT%H%M%SZ"))
}

/// Midnight UTC of the given date.
pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}
