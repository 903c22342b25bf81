//! Merge Engine: per-source event lists into one [`MergedCalendar`].
//!
//! Events are the same occurrence when their UIDs match case-insensitively
//! and their starts are within [`MergeConfig::tolerance`] of the earliest
//! start of the cluster. The copy from the lowest priority number (the
//! source listed first) survives; inside one source the first copy wins.

use std::collections::HashMap;

use calhub_core::{Calendar, Event, MergedCalendar};
use chrono::{Duration, Utc};
use tracing::debug;

use crate::error::MergeError;

/// Merge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Maximum start difference for two copies of one occurrence.
    pub tolerance: Duration,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            tolerance: Duration::milliseconds(1000),
        }
    }
}

impl MergeConfig {
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Combines the event lists of one calendar's sources.
#[derive(Debug, Clone, Default)]
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merges `per_source` (in any order, each event carrying its source tag)
    /// into the calendar's merged view.
    pub fn merge(
        &self,
        calendar: &Calendar,
        per_source: Vec<Vec<Event>>,
        warnings: Vec<String>,
    ) -> Result<MergedCalendar, MergeError> {
        let input: usize = per_source.iter().map(Vec::len).sum();
        let events = self.merge_events(per_source.into_iter().flatten())?;

        debug!(
            slug = %calendar.slug,
            input,
            merged = events.len(),
            collapsed = input - events.len(),
            "Merged calendar"
        );

        Ok(MergedCalendar::new(
            calendar.slug.clone(),
            calendar.name.clone(),
            events,
            warnings,
            Utc::now(),
        ))
    }

    /// Deduplicates and orders events.
    pub fn merge_events(
        &self,
        events: impl IntoIterator<Item = Event>,
    ) -> Result<Vec<Event>, MergeError> {
        // Group by UID, remembering arrival order for in-source ties.
        let mut groups: HashMap<String, Vec<(usize, Event)>> = HashMap::new();
        for (seq, event) in events.into_iter().enumerate() {
            if !event.is_well_formed() {
                return Err(MergeError::InvariantViolation(format!(
                    "event '{}' from {} ends before it starts",
                    event.uid,
                    event.source.display_name()
                )));
            }
            groups.entry(event.uid_key()).or_default().push((seq, event));
        }

        let mut merged = Vec::new();
        for (_, mut group) in groups {
            group.sort_by(|(seq_a, a), (seq_b, b)| {
                a.start
                    .cmp(&b.start)
                    .then(a.source.priority.cmp(&b.source.priority))
                    .then(seq_a.cmp(seq_b))
            });
            self.collapse(group, &mut merged);
        }

        merged.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then(a.source.priority.cmp(&b.source.priority))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.uid.cmp(&b.uid))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(merged)
    }

    /// Collapses one start-ordered UID group into clusters, keeping the best
    /// copy of each.
    fn collapse(&self, group: Vec<(usize, Event)>, out: &mut Vec<Event>) {
        let mut cluster: Option<(chrono::DateTime<Utc>, usize, Event)> = None;

        for (seq, event) in group {
            let same = cluster
                .as_ref()
                .is_some_and(|(anchor, _, _)| event.start - *anchor <= self.config.tolerance);

            if !same {
                if let Some((_, _, best)) = cluster.replace((event.start, seq, event)) {
                    out.push(best);
                }
                continue;
            }
            if let Some((_, best_seq, best)) = cluster.as_mut()
                && (event.source.priority, seq) < (best.source.priority, *best_seq)
            {
                *best_seq = seq;
                *best = event;
            }
        }

        if let Some((_, _, best)) = cluster {
            out.push(best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calhub_core::{Source, SourceTag};
    use chrono::{DateTime, TimeZone};

    fn tag(priority: usize) -> SourceTag {
        SourceTag {
            priority,
            url: format!("https://s{priority}.example/cal.ics"),
            label: Some(format!("source {priority}")),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn event(uid: &str, title: &str, start: DateTime<Utc>, priority: usize) -> Event {
        Event::new(uid, title, start, start + Duration::hours(1), tag(priority))
    }

    fn calendar() -> Calendar {
        Calendar::new("parks", "Parks")
            .with_source(Source::new("https://s0.example/cal.ics").unwrap())
            .with_source(Source::new("https://s1.example/cal.ics").unwrap())
    }

    #[test]
    fn duplicate_uid_and_start_keeps_higher_priority_source() {
        let engine = MergeEngine::default();
        let merged = engine
            .merge(
                &calendar(),
                vec![
                    vec![event("abc123", "From second", at(10, 0, 0), 1)],
                    vec![event("abc123", "From first", at(10, 0, 0), 0)],
                ],
                Vec::new(),
            )
            .unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.events[0].title, "From first");
        assert_eq!(merged.events[0].source.priority, 0);
    }

    #[test]
    fn uid_match_is_case_insensitive() {
        let engine = MergeEngine::default();
        let events = engine
            .merge_events(vec![
                event("ABC@host", "Upper", at(10, 0, 0), 1),
                event("abc@host", "Lower", at(10, 0, 0), 0),
            ])
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Lower");
    }

    #[test]
    fn starts_within_tolerance_collapse() {
        let engine = MergeEngine::default();
        let events = engine
            .merge_events(vec![
                event("x", "A", at(10, 0, 0), 0),
                event("x", "B", at(10, 0, 0) + Duration::milliseconds(400), 1),
            ])
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "A");
    }

    #[test]
    fn starts_beyond_tolerance_stay_separate() {
        let engine = MergeEngine::new(MergeConfig::default().with_tolerance(Duration::zero()));
        let events = engine
            .merge_events(vec![
                event("x", "A", at(10, 0, 0), 0),
                event("x", "B", at(10, 0, 1), 1),
            ])
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn recurring_instances_are_not_collapsed() {
        let engine = MergeEngine::default();
        let events = engine
            .merge_events((0..4).map(|week| {
                event("weekly", "Standup", at(9, 0, 0) + Duration::weeks(week), 0)
            }))
            .unwrap();
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn first_copy_wins_within_one_source() {
        let engine = MergeEngine::default();
        let events = engine
            .merge_events(vec![
                event("dup", "First", at(10, 0, 0), 0),
                event("dup", "Second", at(10, 0, 0), 0),
            ])
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "First");
    }

    #[test]
    fn ordering_is_start_then_priority_then_title() {
        let engine = MergeEngine::default();
        let events = engine
            .merge_events(vec![
                event("d", "Zebra", at(11, 0, 0), 0),
                event("c", "Beta", at(10, 0, 0), 1),
                event("b", "Alpha", at(10, 0, 0), 1),
                event("a", "Omega", at(10, 0, 0), 0),
            ])
            .unwrap();

        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Omega", "Alpha", "Beta", "Zebra"]);
    }

    #[test]
    fn merging_twice_gives_same_fingerprint() {
        let engine = MergeEngine::default();
        let input = || {
            vec![
                vec![
                    event("a", "One", at(9, 0, 0), 0),
                    event("b", "Two", at(12, 0, 0), 0),
                ],
                vec![
                    event("a", "One elsewhere", at(9, 0, 0), 1),
                    event("c", "Three", at(10, 0, 0), 1),
                ],
            ]
        };

        let first = engine.merge(&calendar(), input(), Vec::new()).unwrap();
        let second = engine.merge(&calendar(), input(), Vec::new()).unwrap();
        assert_eq!(first.events, second.events);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn merged_calendar_carries_name_and_warnings() {
        let engine = MergeEngine::default();
        let merged = engine
            .merge(&calendar(), Vec::new(), vec!["source 1: timeout".into()])
            .unwrap();
        assert!(merged.is_empty());
        assert_eq!(merged.slug, "parks");
        assert_eq!(merged.name, "Parks");
        assert_eq!(merged.warnings, ["source 1: timeout"]);
    }

    #[test]
    fn inverted_event_is_an_invariant_violation() {
        let engine = MergeEngine::default();
        let mut bad = event("bad", "Bad", at(10, 0, 0), 0);
        bad.end = bad.start - Duration::minutes(5);

        let err = engine.merge_events(vec![bad]).unwrap_err();
        assert!(matches!(err, MergeError::InvariantViolation(_)));
    }
}
