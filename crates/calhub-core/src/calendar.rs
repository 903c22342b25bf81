//! The merged, cacheable result for one calendar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::event::Event;

/// A merged calendar ready to be served.
///
/// Instances are immutable once built; the cache hands out shared
/// references and replaces them wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedCalendar {
    pub slug: String,
    pub name: String,
    /// Deduplicated events, sorted by start.
    pub events: Vec<Event>,
    /// When the calendar was assembled.
    pub generated_at: DateTime<Utc>,
    /// Content hash over the event list.
    pub fingerprint: String,
    /// Non-fatal problems met while building (failed sources, skipped events).
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl MergedCalendar {
    /// Builds a calendar and computes its fingerprint.
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        events: Vec<Event>,
        warnings: Vec<String>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let fingerprint = fingerprint(&events);
        Self {
            slug: slug.into(),
            name: name.into(),
            events,
            generated_at,
            fingerprint,
            warnings,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether both calendars carry the same events.
    pub fn same_content(&self, other: &MergedCalendar) -> bool {
        self.fingerprint == other.fingerprint
    }

    /// Events that overlap `[start, end)`.
    pub fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &Event> {
        self.events
            .iter()
            .filter(move |event| event.start < end && (event.end > start || event.start >= start))
    }
}

/// Hex SHA-256 over the ordered event list.
///
/// Every field is length-prefixed so adjacent values cannot run into each
/// other. `generated_at` and warnings are not part of the hash.
pub fn fingerprint(events: &[Event]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((events.len() as u64).to_le_bytes());
    for event in events {
        field(&mut hasher, event.id.as_bytes());
        field(&mut hasher, event.uid.as_bytes());
        field(&mut hasher, event.title.as_bytes());
        hasher.update(event.start.timestamp_millis().to_le_bytes());
        hasher.update(event.end.timestamp_millis().to_le_bytes());
        hasher.update([u8::from(event.all_day)]);
        optional(&mut hasher, event.location.as_deref());
        optional(&mut hasher, event.description.as_deref());
        optional(&mut hasher, event.url.as_deref());
        match event.recurrence_id {
            Some(rid) => {
                hasher.update([1]);
                hasher.update(rid.timestamp_millis().to_le_bytes());
            }
            None => hasher.update([0]),
        }
        field(&mut hasher, event.source.display_name().as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1]);
            field(hasher, value.as_bytes());
        }
        None => hasher.update([0]),
    }
}
