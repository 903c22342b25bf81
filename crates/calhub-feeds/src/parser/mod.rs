//! Calendar Parser: iCalendar text to normalized event instances.
//!
//! Parsing is lenient per event and strict per document. A document without
//! a VCALENDAR is a [`ParseError`](crate::FeedErrorCode::ParseError); a
//! single VEVENT that is broken, lacks a UID or DTSTART, or ends before it
//! starts is skipped and reported in [`ParsedFeed::warnings`].
//!
//! Recurring events are expanded inside the [`TimeWindow`]. RECURRENCE-ID
//! overrides replace the instance they name, EXDATE removes instances and
//! RDATE adds them. Cancelled events and cancelled overrides are dropped.

mod component;
mod recurrence;
mod timezone;
mod value;

use std::collections::{BTreeSet, HashMap, HashSet};

use calhub_core::event::midnight;
use calhub_core::{Event, SourceTag, TimeWindow};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::document::RawDocument;
use crate::error::{FeedError, FeedResult};

use component::{Node, read_components};
use recurrence::{MAX_OCCURRENCES, Series, expand};
use timezone::{Zone, ZoneRegistry};
use value::{IcalTime, parse_duration, parse_time, parse_time_list, unescape_text};

pub use timezone::iana_zone;

/// Output of parsing one document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Event instances overlapping the window, sorted by start.
    pub events: Vec<Event>,
    /// Problems that did not prevent parsing.
    pub warnings: Vec<String>,
    /// `X-WR-CALNAME` of the feed.
    pub calendar_name: Option<String>,
    /// Number of VEVENTs that were skipped.
    pub skipped: usize,
}

/// Parses a fetched document.
pub fn parse_document(
    doc: &RawDocument,
    tag: &SourceTag,
    window: &TimeWindow,
) -> FeedResult<ParsedFeed> {
    parse_ics(&doc.text(), tag, window).map_err(|e| e.with_url(doc.source.url.as_str()))
}

/// Parses iCalendar text.
pub fn parse_ics(text: &str, tag: &SourceTag, window: &TimeWindow) -> FeedResult<ParsedFeed> {
    let text = text.trim_start_matches('\u{feff}');
    if !text.to_ascii_uppercase().contains("BEGIN:VCALENDAR") {
        return Err(FeedError::parse("document contains no VCALENDAR"));
    }

    let tree = read_components(text);
    let registry = ZoneRegistry::from_components(
        &tree.components,
        (window.end + Duration::days(366)).naive_utc(),
    );

    let mut parser = FeedParser {
        tag,
        window,
        registry,
        feed: ParsedFeed {
            calendar_name: tree.calendar_name.clone(),
            ..ParsedFeed::default()
        },
        unknown_tzids: BTreeSet::new(),
    };

    for rejected in &tree.rejected {
        if rejected.name == "VEVENT" {
            parser.skip(None, &format!("malformed component: {}", rejected.reason));
        } else {
            debug!(component = %rejected.name, reason = %rejected.reason, "Ignoring unparseable component");
        }
    }

    let mut masters = Vec::new();
    let mut overrides: HashMap<String, Vec<VEvent>> = HashMap::new();
    let mut ignored = 0usize;

    for node in &tree.components {
        if node.name != "VEVENT" {
            if node.name != "VTIMEZONE" {
                ignored += 1;
            }
            continue;
        }
        match VEvent::decode(node) {
            Ok(vevent) if vevent.recurrence_id.is_some() => overrides
                .entry(vevent.uid.to_lowercase())
                .or_default()
                .push(vevent),
            Ok(vevent) => masters.push(vevent),
            Err(reason) => {
                let uid = node.value("UID").map(str::to_string);
                parser.skip(uid.as_deref(), &reason);
            }
        }
    }
    if ignored > 0 {
        debug!(count = ignored, "Ignored non-event components");
    }

    for master in &masters {
        let own = overrides
            .remove(&master.uid.to_lowercase())
            .unwrap_or_default();
        parser.expand_master(master, own);
    }
    // Overrides whose master is missing still describe a real instance.
    for orphan in overrides.into_values().flatten() {
        parser.single(&orphan);
    }

    Ok(parser.finish())
}

/// A decoded VEVENT before timezone resolution.
#[derive(Debug, Clone)]
struct VEvent {
    uid: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    url: Option<String>,
    cancelled: bool,
    start: IcalTime,
    end: Option<IcalTime>,
    duration: Option<Duration>,
    rrule: Option<String>,
    rdates: Vec<IcalTime>,
    exdates: Vec<IcalTime>,
    recurrence_id: Option<IcalTime>,
}

impl VEvent {
    fn decode(node: &Node) -> Result<Self, String> {
        let uid = node
            .value("UID")
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .ok_or("missing UID")?
            .to_string();

        let start_prop = node.prop("DTSTART").ok_or("missing DTSTART")?;
        let start = parse_time(
            &start_prop.value,
            start_prop.param("TZID"),
            start_prop.param("VALUE"),
        )
        .map_err(|e| format!("DTSTART: {e}"))?;

        let end = node
            .prop("DTEND")
            .map(|p| parse_time(&p.value, p.param("TZID"), p.param("VALUE")))
            .transpose()
            .map_err(|e| format!("DTEND: {e}"))?;

        let duration = match (&end, node.value("DURATION")) {
            (None, Some(raw)) => Some(parse_duration(raw).map_err(|e| format!("DURATION: {e}"))?),
            _ => None,
        };

        let recurrence_id = node
            .prop("RECURRENCE-ID")
            .map(|p| parse_time(&p.value, p.param("TZID"), p.param("VALUE")))
            .transpose()
            .map_err(|e| format!("RECURRENCE-ID: {e}"))?;

        let text = |name: &str| {
            node.value(name)
                .map(unescape_text)
                .filter(|v| !v.trim().is_empty())
        };

        let time_list = |name: &str| {
            node.props(name)
                .flat_map(|p| parse_time_list(&p.value, p.param("TZID"), p.param("VALUE")))
                .filter_map(|r| r.map_err(|e| debug!(property = name, error = %e, "Ignoring bad date")).ok())
                .collect::<Vec<_>>()
        };

        Ok(Self {
            summary: text("SUMMARY"),
            description: text("DESCRIPTION"),
            location: text("LOCATION"),
            url: node.value("URL").map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            cancelled: node
                .value("STATUS")
                .is_some_and(|s| s.trim().eq_ignore_ascii_case("CANCELLED")),
            rrule: node.value("RRULE").map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            rdates: time_list("RDATE"),
            exdates: time_list("EXDATE"),
            uid,
            start,
            end,
            duration,
            recurrence_id,
        })
    }

    fn all_day(&self) -> bool {
        self.start.is_date()
    }
}

struct FeedParser<'a> {
    tag: &'a SourceTag,
    window: &'a TimeWindow,
    registry: ZoneRegistry,
    feed: ParsedFeed,
    unknown_tzids: BTreeSet<String>,
}

impl FeedParser<'_> {
    fn skip(&mut self, uid: Option<&str>, reason: &str) {
        let message = match uid {
            Some(uid) => format!("{}: skipped event '{uid}': {reason}", self.tag.display_name()),
            None => format!("{}: skipped event: {reason}", self.tag.display_name()),
        };
        warn!(source = %self.tag.display_name(), uid = uid.unwrap_or(""), reason = %reason, "Skipping malformed event");
        self.feed.warnings.push(message);
        self.feed.skipped += 1;
    }

    /// Zone of a TZID, UTC (and a warning) when unknown.
    fn zone(&mut self, tzid: &str) -> Zone {
        match self.registry.resolve(tzid) {
            Some(zone) => zone,
            None => {
                self.unknown_tzids.insert(tzid.to_string());
                Zone::Utc
            }
        }
    }

    /// Zone the event's wall-clock times belong to.
    fn event_zone(&mut self, start: &IcalTime) -> Zone {
        match start.tzid() {
            Some(tzid) => self.zone(tzid),
            None => Zone::Utc,
        }
    }

    /// Resolves a value to an instant. Floating values use `floating`.
    fn instant(&mut self, time: &IcalTime, floating: &Zone) -> DateTime<Utc> {
        match time {
            IcalTime::Date(date) => midnight(*date),
            IcalTime::Utc(dt) => dt.and_utc(),
            IcalTime::Floating(dt) => floating.to_utc(*dt),
            IcalTime::Zoned { local, tzid } => self.zone(tzid).to_utc(*local),
        }
    }

    /// Start, end and zone of an event, or the reason it is unusable.
    fn span(&mut self, vevent: &VEvent) -> Result<(DateTime<Utc>, DateTime<Utc>, Zone), String> {
        let zone = self.event_zone(&vevent.start);
        let start = self.instant(&vevent.start, &zone);
        let end = match (&vevent.end, vevent.duration) {
            (Some(end), _) => self.instant(end, &zone),
            (None, Some(duration)) => start + duration,
            (None, None) if vevent.all_day() => start + Duration::days(1),
            (None, None) => start,
        };
        if end < start {
            return Err("ends before it starts".to_string());
        }
        Ok((start, end, zone))
    }

    fn expand_master(&mut self, master: &VEvent, overrides: Vec<VEvent>) {
        if master.cancelled {
            debug!(uid = %master.uid, "Dropping cancelled event");
            return;
        }
        let (start, end, zone) = match self.span(master) {
            Ok(span) => span,
            Err(reason) => {
                self.skip(Some(&master.uid), &reason);
                return;
            }
        };
        let duration = end - start;
        let all_day = master.all_day();
        let recurring = master.rrule.is_some() || !master.rdates.is_empty();

        if !recurring && overrides.is_empty() {
            self.push(master, start, end, all_day, None);
            return;
        }

        let mut starts = match master.rrule {
            Some(ref rule) => {
                let series = Series {
                    rule,
                    start: master.start.naive(),
                    zone: &zone,
                    all_day,
                    duration,
                };
                match expand(&series, self.window) {
                    Ok(expansion) => {
                        if expansion.truncated {
                            self.feed.warnings.push(format!(
                                "{}: event '{}' has more than {MAX_OCCURRENCES} occurrences in the window, later ones were dropped",
                                self.tag.display_name(),
                                master.uid
                            ));
                        }
                        expansion.starts
                    }
                    Err(err) => {
                        let message = format!(
                            "{}: event '{}' has an unusable recurrence rule, keeping the first occurrence only: {err}",
                            self.tag.display_name(),
                            master.uid
                        );
                        warn!(uid = %master.uid, error = %err, "Unusable recurrence rule");
                        self.feed.warnings.push(message);
                        vec![start]
                    }
                }
            }
            None => vec![start],
        };

        for rdate in &master.rdates {
            starts.push(self.instant(rdate, &zone));
        }

        let mut excluded_instants = HashSet::new();
        let mut excluded_days: HashSet<NaiveDate> = HashSet::new();
        for exdate in &master.exdates {
            match exdate {
                IcalTime::Date(day) => {
                    excluded_days.insert(*day);
                }
                other => {
                    excluded_instants.insert(self.instant(other, &zone));
                }
            }
        }

        let mut replacements: HashMap<DateTime<Utc>, &VEvent> = HashMap::new();
        for instance in &overrides {
            if let Some(ref rid) = instance.recurrence_id {
                let key = self.instant(rid, &zone);
                replacements.insert(key, instance);
            }
        }

        starts.sort();
        starts.dedup();
        for occurrence in starts {
            let day = if all_day {
                occurrence.date_naive()
            } else {
                zone.to_local(occurrence).date()
            };
            if excluded_instants.contains(&occurrence) || excluded_days.contains(&day) {
                continue;
            }
            match replacements.remove(&occurrence) {
                Some(replacement) => self.replacement(replacement, occurrence),
                None => self.push(
                    master,
                    occurrence,
                    occurrence + duration,
                    all_day,
                    Some(occurrence),
                ),
            }
        }

        // Overrides for instances outside the generated set (moved into the
        // window, or beyond the expansion padding) stand on their own.
        let mut leftovers: Vec<_> = replacements.into_iter().collect();
        leftovers.sort_by_key(|(rid, _)| *rid);
        for (rid, replacement) in leftovers {
            self.replacement(replacement, rid);
        }
    }

    fn replacement(&mut self, instance: &VEvent, recurrence_id: DateTime<Utc>) {
        if instance.cancelled {
            debug!(uid = %instance.uid, %recurrence_id, "Dropping cancelled instance");
            return;
        }
        match self.span(instance) {
            Ok((start, end, _)) => {
                self.push(instance, start, end, instance.all_day(), Some(recurrence_id))
            }
            Err(reason) => self.skip(Some(&instance.uid), &reason),
        }
    }

    /// An override without a master in this document.
    fn single(&mut self, instance: &VEvent) {
        let zone = self.event_zone(&instance.start);
        let rid = instance
            .recurrence_id
            .as_ref()
            .map(|rid| self.instant(rid, &zone));
        match rid {
            Some(rid) => self.replacement(instance, rid),
            None => {
                if let Ok((start, end, _)) = self.span(instance) {
                    self.push(instance, start, end, instance.all_day(), None);
                }
            }
        }
    }

    fn push(
        &mut self,
        vevent: &VEvent,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        all_day: bool,
        recurrence_id: Option<DateTime<Utc>>,
    ) {
        if !self.window.overlaps(start, end) {
            return;
        }
        let mut event = Event::new(
            vevent.uid.clone(),
            vevent.summary.clone().unwrap_or_default(),
            start,
            end,
            self.tag.clone(),
        )
        .with_all_day(all_day);
        if let Some(ref location) = vevent.location {
            event = event.with_location(location.clone());
        }
        if let Some(ref description) = vevent.description {
            event = event.with_description(description.clone());
        }
        if let Some(ref url) = vevent.url {
            event = event.with_url(url.clone());
        }
        if let Some(rid) = recurrence_id {
            event = event.with_recurrence_id(rid);
        }
        self.feed.events.push(event);
    }

    fn finish(mut self) -> ParsedFeed {
        for tzid in &self.unknown_tzids {
            warn!(source = %self.tag.display_name(), tzid = %tzid, "Unknown timezone, using UTC");
            self.feed.warnings.push(format!(
                "{}: unknown timezone '{tzid}', times interpreted as UTC",
                self.tag.display_name()
            ));
        }
        // Stable: document order breaks start ties.
        self.feed.events.sort_by_key(|e| e.start);
        debug!(
            source = %self.tag.display_name(),
            events = self.feed.events.len(),
            skipped = self.feed.skipped,
            "Parsed feed"
        );
        self.feed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calhub_core::event::UNTITLED;
    use chrono::TimeZone;

    fn tag() -> SourceTag {
        SourceTag {
            priority: 0,
            url: "https://feeds.example/a.ics".into(),
            label: Some("Parks".into()),
        }
    }

    fn window_2024() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn calendar(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{body}END:VCALENDAR\r\n")
    }

    fn vevent(uid: &str, props: &str) -> String {
        format!("BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20240101T000000Z\r\n{props}END:VEVENT\r\n")
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn rejects_non_calendar_documents() {
        let err = parse_ics("<html>Service unavailable</html>", &tag(), &window_2024()).unwrap_err();
        assert_eq!(err.code(), crate::FeedErrorCode::ParseError);
    }

    #[test]
    fn simple_event_fields() {
        let doc = calendar(&vevent(
            "e1",
            "DTSTART:20240305T180000Z\r\nDTEND:20240305T200000Z\r\nSUMMARY:Book club\\, March\r\nLOCATION:Library\r\nDESCRIPTION:Bring the book\r\nURL:https://example.com/e1\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 1);
        assert!(feed.warnings.is_empty());

        let event = &feed.events[0];
        assert_eq!(event.uid, "e1");
        assert_eq!(event.title, "Book club, March");
        assert_eq!(event.start, utc(2024, 3, 5, 18, 0));
        assert_eq!(event.end, utc(2024, 3, 5, 20, 0));
        assert_eq!(event.location.as_deref(), Some("Library"));
        assert_eq!(event.url.as_deref(), Some("https://example.com/e1"));
        assert!(!event.all_day);
        assert!(event.recurrence_id.is_none());
        assert_eq!(event.source.label.as_deref(), Some("Parks"));
    }

    #[test]
    fn missing_summary_gets_placeholder() {
        let doc = calendar(&vevent("e1", "DTSTART:20240305T180000Z\r\n"));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events[0].title, UNTITLED);
        assert_eq!(feed.events[0].start, feed.events[0].end);
    }

    #[test]
    fn all_day_events_use_midnight_utc() {
        let doc = calendar(&vevent(
            "fair",
            "DTSTART;VALUE=DATE:20240704\r\nSUMMARY:Fair\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        let event = &feed.events[0];
        assert!(event.all_day);
        assert_eq!(event.start, utc(2024, 7, 4, 0, 0));
        assert_eq!(event.end, utc(2024, 7, 5, 0, 0));
    }

    #[test]
    fn duration_is_used_without_dtend() {
        let doc = calendar(&vevent(
            "e1",
            "DTSTART:20240305T180000Z\r\nDURATION:PT90M\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events[0].end, utc(2024, 3, 5, 19, 30));
    }

    #[test]
    fn tzid_is_resolved() {
        let doc = calendar(&vevent(
            "e1",
            "DTSTART;TZID=America/New_York:20240701T090000\r\nDTEND;TZID=America/New_York:20240701T100000\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events[0].start, utc(2024, 7, 1, 13, 0));
        assert_eq!(feed.events[0].end, utc(2024, 7, 1, 14, 0));
    }

    #[test]
    fn unknown_tzid_falls_back_to_utc_with_one_warning() {
        let body = vevent("e1", "DTSTART;TZID=Mars/Base:20240701T090000\r\n")
            + &vevent("e2", "DTSTART;TZID=Mars/Base:20240702T090000\r\n");
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 2);
        assert_eq!(feed.events[0].start, utc(2024, 7, 1, 9, 0));
        assert_eq!(feed.warnings.len(), 1);
        assert!(feed.warnings[0].contains("Mars/Base"));
    }

    #[test]
    fn embedded_vtimezone_is_honoured() {
        let tz = "BEGIN:VTIMEZONE\r\n\
TZID:Fixed-Plus-Five\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19700101T000000\r\n\
TZOFFSETFROM:+0500\r\n\
TZOFFSETTO:+0500\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n";
        let body = format!(
            "{tz}{}",
            vevent("e1", "DTSTART;TZID=Fixed-Plus-Five:20240301T120000\r\n")
        );
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert!(feed.warnings.is_empty());
        assert_eq!(feed.events[0].start, utc(2024, 3, 1, 7, 0));
    }

    #[test]
    fn one_bad_event_among_ten() {
        let mut body = String::new();
        for i in 0..10 {
            if i == 4 {
                body.push_str("BEGIN:VEVENT\r\nUID:broken\r\nTHIS LINE IS NOT A PROPERTY\r\nSUMMARY:Broken\r\nEND:VEVENT\r\n");
            } else {
                body.push_str(&vevent(
                    &format!("ok-{i}"),
                    &format!("DTSTART:202403{:02}T100000Z\r\nSUMMARY:Event {i}\r\n", i + 1),
                ));
            }
        }
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 9);
        assert_eq!(feed.skipped, 1);
        assert_eq!(feed.warnings.len(), 1);
    }

    #[test]
    fn invalid_values_skip_only_that_event() {
        let body = vevent("bad-start", "DTSTART:not-a-date\r\n")
            + &vevent("inverted", "DTSTART:20240305T180000Z\r\nDTEND:20240305T170000Z\r\n")
            + "BEGIN:VEVENT\r\nDTSTART:20240305T180000Z\r\nEND:VEVENT\r\n"
            + &vevent("good", "DTSTART:20240306T180000Z\r\n");
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "good");
        assert_eq!(feed.skipped, 3);
        assert!(feed.warnings.iter().any(|w| w.contains("missing UID")));
        assert!(feed.warnings.iter().any(|w| w.contains("ends before it starts")));
    }

    #[test]
    fn other_components_are_ignored() {
        let body = "BEGIN:VTODO\r\nUID:todo\r\nSUMMARY:Chores\r\nEND:VTODO\r\n\
BEGIN:VFREEBUSY\r\nUID:fb\r\nDTSTART:20240101T000000Z\r\nEND:VFREEBUSY\r\n"
            .to_string()
            + &vevent("e1", "DTSTART:20240305T180000Z\r\n");
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 1);
        assert!(feed.warnings.is_empty());
    }

    #[test]
    fn weekly_recurrence_over_a_year() {
        let doc = calendar(&vevent(
            "weekly",
            "DTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\nRRULE:FREQ=WEEKLY\r\nSUMMARY:Standup\r\n",
        ));
        let window = window_2024();
        let feed = parse_ics(&doc, &tag(), &window).unwrap();
        assert_eq!(feed.events.len(), 53);
        assert!(feed.events.iter().all(|e| window.overlaps(e.start, e.end)));
        assert!(feed.events.iter().all(|e| e.recurrence_id == Some(e.start)));

        let ids: HashSet<_> = feed.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 53);
    }

    #[test]
    fn exdate_rdate_and_overrides() {
        let body = vevent(
            "series",
            "DTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\nRRULE:FREQ=WEEKLY;COUNT=4\r\n\
EXDATE:20240108T100000Z\r\nRDATE:20240120T100000Z\r\nSUMMARY:Class\r\n",
        ) + &vevent(
            "series",
            "RECURRENCE-ID:20240115T100000Z\r\nDTSTART:20240115T140000Z\r\nDTEND:20240115T150000Z\r\nSUMMARY:Class (moved)\r\n",
        ) + &vevent(
            "series",
            "RECURRENCE-ID:20240122T100000Z\r\nDTSTART:20240122T100000Z\r\nSTATUS:CANCELLED\r\n",
        );
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();

        let summary: Vec<_> = feed
            .events
            .iter()
            .map(|e| (e.start, e.title.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (utc(2024, 1, 1, 10, 0), "Class"),
                (utc(2024, 1, 15, 14, 0), "Class (moved)"),
                (utc(2024, 1, 20, 10, 0), "Class"),
            ]
        );
        assert_eq!(feed.events[1].recurrence_id, Some(utc(2024, 1, 15, 10, 0)));
    }

    #[test]
    fn cancelled_events_are_dropped() {
        let body = vevent("gone", "DTSTART:20240305T180000Z\r\nSTATUS:CANCELLED\r\n")
            + &vevent("kept", "DTSTART:20240305T180000Z\r\nSTATUS:CONFIRMED\r\n");
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "kept");
    }

    #[test]
    fn bad_rrule_keeps_first_occurrence() {
        let doc = calendar(&vevent(
            "odd",
            "DTSTART:20240305T180000Z\r\nRRULE:FREQ=FORTNIGHTLY\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].start, utc(2024, 3, 5, 18, 0));
        assert_eq!(feed.warnings.len(), 1);
        assert!(feed.warnings[0].contains("recurrence rule"));
    }

    #[test]
    fn truncated_expansion_is_reported() {
        let doc = calendar(&vevent(
            "ticker",
            "DTSTART:20240101T000000Z\r\nDURATION:PT30S\r\nRRULE:FREQ=MINUTELY\r\nSUMMARY:Tick\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events.len(), usize::from(MAX_OCCURRENCES));
        assert_eq!(feed.warnings.len(), 1);
        assert!(feed.warnings[0].starts_with("Parks: event 'ticker' has more than"));
    }

    #[test]
    fn events_outside_window_are_dropped() {
        let body = vevent("old", "DTSTART:20230305T180000Z\r\n")
            + &vevent("far", "DTSTART:20260305T180000Z\r\n")
            + &vevent(
                "straddle",
                "DTSTART;VALUE=DATE:20231231\r\nDTEND;VALUE=DATE:20240102\r\n",
            );
        let feed = parse_ics(&calendar(&body), &tag(), &window_2024()).unwrap();
        let uids: Vec<_> = feed.events.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["straddle"]);
    }

    #[test]
    fn calendar_name_is_read() {
        let doc = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nX-WR-CALNAME:City Parks\r\n{}END:VCALENDAR\r\n",
            vevent("e1", "DTSTART:20240305T180000Z\r\n")
        );
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.calendar_name.as_deref(), Some("City Parks"));
    }

    #[test]
    fn folded_lines_are_joined() {
        let doc = calendar(&vevent(
            "e1",
            "DTSTART:20240305T180000Z\r\nSUMMARY:A very long title that was\r\n  folded by the server\r\n",
        ));
        let feed = parse_ics(&doc, &tag(), &window_2024()).unwrap();
        assert_eq!(feed.events[0].title, "A very long title that was folded by the server");
    }
}
