//! Rendering merged calendars for clients.
//!
//! Two shapes are produced: an iCalendar document for subscription clients
//! and a JSON event list for the embed page.

use std::collections::HashMap;

use chrono::SecondsFormat;
use icalendar::{Calendar as IcsCalendar, Component, EventLike, Property, ValueType};
use serde::{Deserialize, Serialize};

use crate::calendar::MergedCalendar;
use crate::event::Event;

/// PRODID written into exported documents.
pub const PRODID: &str = "-//CalendarHub//calhub//EN";

/// Renders the calendar as an iCalendar document.
///
/// Timed events are written in UTC; all-day events use `VALUE=DATE`.
/// Every VEVENT is a standalone instance: recurring series are already
/// expanded, so no RECURRENCE-ID is written. An event keeps its upstream
/// UID only when no other exported event shares it; otherwise the instance
/// id becomes the UID and the upstream one moves to `X-CALHUB-UID`.
pub fn to_ics(calendar: &MergedCalendar) -> String {
    let mut cal = IcsCalendar::new();
    let dtstamp = calendar.generated_at.format("%Y%m%dT%H%M%SZ").to_string();

    let mut uid_counts: HashMap<&str, usize> = HashMap::new();
    for event in &calendar.events {
        *uid_counts.entry(event.uid.as_str()).or_default() += 1;
    }

    for event in &calendar.events {
        let mut ics_event = icalendar::Event::new();
        let shared = uid_counts.get(event.uid.as_str()).is_some_and(|&n| n > 1);
        if shared || event.recurrence_id.is_some() {
            ics_event.uid(&event.id);
            ics_event.add_property("X-CALHUB-UID", &event.uid);
        } else {
            ics_event.uid(&event.uid);
        }
        ics_event.summary(&event.title);
        ics_event.add_property("DTSTAMP", &dtstamp);

        add_time(&mut ics_event, "DTSTART", event, event.start);
        add_time(&mut ics_event, "DTEND", event, event.end);

        if let Some(ref description) = event.description {
            ics_event.description(description);
        }
        if let Some(ref location) = event.location {
            ics_event.location(location);
        }
        if let Some(ref url) = event.url {
            ics_event.add_property("URL", url);
        }
        ics_event.add_property("X-CALHUB-SOURCE", event.source.display_name());

        cal.push(ics_event.done());
    }

    let cal = cal.done();
    finish_document(&cal.to_string(), &calendar.name)
}

fn add_time(
    ics_event: &mut icalendar::Event,
    name: &str,
    event: &Event,
    instant: chrono::DateTime<chrono::Utc>,
) {
    if event.all_day {
        let mut prop = Property::new(name, instant.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property(name, instant.format("%Y%m%dT%H%M%SZ").to_string());
    }
}

/// Swaps in our PRODID and adds the calendar name right after it.
fn finish_document(ics: &str, name: &str) -> String {
    let mut out = String::with_capacity(ics.len() + name.len() + 64);
    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:");
            out.push_str(PRODID);
            out.push_str("\r\n");
            out.push_str("X-WR-CALNAME:");
            out.push_str(&escape_text(name));
            out.push_str("\r\n");
            continue;
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// JSON document served to the embed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedView {
    pub slug: String,
    pub name: String,
    pub generated_at: String,
    pub fingerprint: String,
    pub events: Vec<EventView>,
}

/// One event as the embed page consumes it.
///
/// `start`/`end` are RFC 3339 instants for timed events and plain
/// `YYYY-MM-DD` dates (end exclusive) for all-day ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventView {
    pub id: String,
    /// Upstream UID, shared by every instance of a series.
    pub uid: String,
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(rename = "allDay")]
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source: String,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        let (start, end) = if event.all_day {
            (
                event.start_date().format("%Y-%m-%d").to_string(),
                event.end_date().format("%Y-%m-%d").to_string(),
            )
        } else {
            (
                event.start.to_rfc3339_opts(SecondsFormat::Secs, true),
                event.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
        };
        Self {
            id: event.id.clone(),
            uid: event.uid.clone(),
            title: event.title.clone(),
            start,
            end,
            all_day: event.all_day,
            location: event.location.clone(),
            description: event.description.clone(),
            url: event.url.clone(),
            source: event.source.display_name().to_string(),
        }
    }
}

impl From<&MergedCalendar> for FeedView {
    fn from(calendar: &MergedCalendar) -> Self {
        Self {
            slug: calendar.slug.clone(),
            name: calendar.name.clone(),
            generated_at: calendar
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            fingerprint: calendar.fingerprint.clone(),
            events: calendar.events.iter().map(EventView::from).collect(),
        }
    }
}

/// Renders the calendar as the embed page's JSON document.
pub fn to_json(calendar: &MergedCalendar) -> serde_json::Result<String> {
    serde_json::to_string(&FeedView::from(calendar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SourceTag;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn sample() -> MergedCalendar {
        let tag = SourceTag {
            priority: 0,
            url: "https://a.example/a.ics".into(),
            label: Some("Parks".into()),
        };
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap();
        let timed = Event::new("concert-1", "Concert", start, start + Duration::hours(2), tag.clone())
            .with_location("Bandshell");
        let all_day = Event::all_day(
            "fair-1",
            "Fair",
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
            tag,
        );
        MergedCalendar::new(
            "community",
            "Community, Events",
            vec![timed, all_day],
            vec![],
            Utc.with_ymd_and_hms(2024, 5, 30, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn ics_contains_events_and_name() {
        let ics = to_ics(&sample());
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("PRODID:-//CalendarHub//calhub//EN\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Community\\, Events\r\n"));
        assert!(ics.contains("UID:concert-1"));
        assert!(ics.contains("DTSTART:20240601T170000Z"));
        assert!(ics.contains("DTEND:20240601T190000Z"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20240602"));
        assert!(ics.contains("DTEND;VALUE=DATE:20240604"));
        assert!(ics.contains("DTSTAMP:20240530T120000Z"));
        assert!(ics.contains("X-CALHUB-SOURCE:Parks"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    }

    #[test]
    fn json_view_shapes_dates() {
        let view = FeedView::from(&sample());
        assert_eq!(view.events.len(), 2);

        let timed = &view.events[0];
        assert_eq!(timed.start, "2024-06-01T17:00:00Z");
        assert!(!timed.all_day);
        assert_eq!(timed.source, "Parks");
        assert_eq!(timed.uid, "concert-1");
        assert_eq!(timed.location.as_deref(), Some("Bandshell"));

        let all_day = &view.events[1];
        assert_eq!(all_day.start, "2024-06-02");
        assert_eq!(all_day.end, "2024-06-04");
        assert!(all_day.all_day);
    }

    #[test]
    fn json_uses_all_day_camel_case() {
        let json = to_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["slug"], "community");
        assert_eq!(value["events"][1]["allDay"], true);
        assert!(value["events"][1].get("location").is_none());
    }

    #[test]
    fn json_keeps_uid_containing_at_sign() {
        let tag = SourceTag {
            priority: 0,
            url: "https://a.example/a.ics".into(),
            label: None,
        };
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap();
        let event = Event::new("abc@host", "Talk", start, start + Duration::hours(1), tag);
        let calendar = MergedCalendar::new("talks", "Talks", vec![event], vec![], start);

        let value: serde_json::Value = serde_json::from_str(&to_json(&calendar).unwrap()).unwrap();
        assert_eq!(value["events"][0]["uid"], "abc@host");
    }

    #[test]
    fn ics_uids_are_unique_per_vevent() {
        let tag = |priority| SourceTag {
            priority,
            url: format!("https://{priority}.example/feed.ics"),
            label: None,
        };
        let first = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let later = first + Duration::hours(5);
        let weekly = first + Duration::days(7);
        let events = vec![
            Event::new("1", "Morning", first, first + Duration::hours(1), tag(0)),
            Event::new("1", "Afternoon", later, later + Duration::hours(1), tag(1)),
            Event::new("series", "Class", weekly, weekly + Duration::hours(1), tag(0))
                .with_recurrence_id(weekly),
            Event::new("solo", "Solo", first, first + Duration::hours(2), tag(1)),
        ];
        let calendar = MergedCalendar::new("mixed", "Mixed", events, vec![], first);
        let ics = to_ics(&calendar);

        let uids: Vec<&str> = ics
            .lines()
            .filter_map(|line| line.strip_prefix("UID:"))
            .collect();
        assert_eq!(uids.len(), 4);
        let unique: std::collections::HashSet<&str> = uids.iter().copied().collect();
        assert_eq!(unique.len(), 4, "duplicate UIDs in {uids:?}");

        assert!(uids.contains(&"solo"));
        assert!(!uids.contains(&"1"));
        assert_eq!(ics.matches("X-CALHUB-UID:1\r\n").count(), 2);
        assert!(ics.contains("X-CALHUB-UID:series\r\n"));
        assert!(!ics.contains("RECURRENCE-ID"));
    }
}
