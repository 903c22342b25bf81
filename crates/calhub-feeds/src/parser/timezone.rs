//! Timezone resolution for TZID references.
//!
//! A TZID resolves, in order, through an embedded VTIMEZONE whose
//! `X-LIC-LOCATION` names an IANA zone, the TZID itself as an IANA name
//! (including path-style ids such as `/mozilla.org/20070129_1/Europe/Paris`),
//! and finally the observance rules of the embedded VTIMEZONE. Unresolvable
//! ids are reported by the caller and treated as UTC.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::debug;

use super::component::Node;
use super::value::{parse_time, parse_utc_offset};

/// A resolved timezone.
#[derive(Debug, Clone)]
pub enum Zone {
    Utc,
    Named(Tz),
    /// Offsets computed from an embedded VTIMEZONE.
    Custom(Arc<CustomZone>),
}

impl Zone {
    /// Converts a wall-clock time to an instant.
    ///
    /// Times inside a spring-forward gap are shifted forward by one hour;
    /// ambiguous fall-back times take the earlier instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self {
            Zone::Utc => local.and_utc(),
            Zone::Named(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| local.and_utc()),
            Zone::Custom(zone) => zone.to_utc(local),
        }
    }

    /// Converts an instant to wall-clock time in this zone.
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Utc => instant.naive_utc(),
            Zone::Named(tz) => instant.with_timezone(tz).naive_local(),
            Zone::Custom(zone) => zone.to_local(instant),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Zone::Utc => "UTC",
            Zone::Named(tz) => tz.name(),
            Zone::Custom(zone) => &zone.tzid,
        }
    }
}

/// Offset transitions read from a VTIMEZONE.
#[derive(Debug)]
pub struct CustomZone {
    tzid: String,
    /// Sorted by wall-clock onset: (onset, offset before, offset after), seconds east.
    transitions: Vec<(NaiveDateTime, i32, i32)>,
}

impl CustomZone {
    fn offset_at_local(&self, local: NaiveDateTime) -> i32 {
        let idx = self.transitions.partition_point(|(onset, _, _)| *onset <= local);
        match idx {
            0 => self.transitions.first().map(|t| t.1).unwrap_or(0),
            n => self.transitions[n - 1].2,
        }
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let offset = self.offset_at_local(local);
        (local - Duration::seconds(i64::from(offset))).and_utc()
    }

    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        let naive = instant.naive_utc();
        let guess = naive + Duration::seconds(i64::from(self.offset_at_local(naive)));
        naive + Duration::seconds(i64::from(self.offset_at_local(guess)))
    }

    /// Builds transitions up to `until` from STANDARD/DAYLIGHT children.
    pub fn from_vtimezone(tzid: &str, node: &Node, until: NaiveDateTime) -> Option<Self> {
        let mut transitions = Vec::new();

        for observance in node
            .children
            .iter()
            .filter(|c| c.name == "STANDARD" || c.name == "DAYLIGHT")
        {
            let Some(start) = observance
                .value("DTSTART")
                .and_then(|v| parse_time(v, None, None).ok())
                .map(|t| t.naive())
            else {
                continue;
            };
            let Some(offset_to) = observance
                .value("TZOFFSETTO")
                .and_then(|v| parse_utc_offset(v).ok())
            else {
                continue;
            };
            let offset_from = observance
                .value("TZOFFSETFROM")
                .and_then(|v| parse_utc_offset(v).ok())
                .unwrap_or(offset_to);

            let mut onsets = vec![start];
            if let Some(rule) = observance.value("RRULE") {
                onsets.extend(observance_onsets(start, rule, offset_from, until));
            }
            for rdate in observance.props("RDATE") {
                for part in rdate.value.split(',') {
                    if let Ok(time) = parse_time(part, None, rdate.param("VALUE")) {
                        onsets.push(time.naive());
                    }
                }
            }

            transitions.extend(
                onsets
                    .into_iter()
                    .filter(|onset| *onset <= until)
                    .map(|onset| (onset, offset_from, offset_to)),
            );
        }

        if transitions.is_empty() {
            return None;
        }
        transitions.sort_by_key(|t| t.0);
        transitions.dedup_by_key(|t| t.0);

        Some(Self {
            tzid: tzid.to_string(),
            transitions,
        })
    }
}

/// Wall-clock onsets generated by an observance RRULE.
fn observance_onsets(
    start: NaiveDateTime,
    rule: &str,
    offset_from: i32,
    until: NaiveDateTime,
) -> Vec<NaiveDateTime> {
    // UNTIL in observance rules is UTC; rewrite it to wall time before the
    // rule is evaluated against a wall-clock DTSTART.
    let rule = rule
        .split(';')
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => {
                match parse_time(value, None, None) {
                    Ok(time) => {
                        let wall = time.naive() + Duration::seconds(i64::from(offset_from));
                        format!("UNTIL={}", wall.format("%Y%m%dT%H%M%SZ"))
                    }
                    Err(_) => part.to_string(),
                }
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";");

    let text = format!("DTSTART:{}Z\nRRULE:{}", start.format("%Y%m%dT%H%M%S"), rule);
    let set = match text.parse::<RRuleSet>() {
        Ok(set) => set,
        Err(err) => {
            debug!(rule = %rule, error = %err, "Ignoring unparseable VTIMEZONE rule");
            return Vec::new();
        }
    };
    let tz: rrule::Tz = Utc.into();
    let before = until.and_utc().with_timezone(&tz);
    set.before(before)
        .all(u16::MAX)
        .dates
        .iter()
        .map(|d| d.naive_utc())
        .collect()
}

/// Looks up an IANA zone, accepting path-style ids.
pub fn iana_zone(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');
    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }
    let segments: Vec<&str> = tzid.split('/').filter(|s| !s.is_empty()).collect();
    (1..segments.len()).find_map(|skip| segments[skip..].join("/").parse::<Tz>().ok())
}

/// The VTIMEZONE definitions of one document.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: HashMap<String, Zone>,
}

impl ZoneRegistry {
    /// Indexes every VTIMEZONE in the document. Observance rules are
    /// expanded up to `until`.
    pub fn from_components<'a>(
        components: impl IntoIterator<Item = &'a Node>,
        until: NaiveDateTime,
    ) -> Self {
        let mut zones = HashMap::new();
        for node in components.into_iter().filter(|c| c.name == "VTIMEZONE") {
            let Some(tzid) = node.value("TZID").map(|t| t.trim().to_string()) else {
                continue;
            };
            let zone = node
                .value("X-LIC-LOCATION")
                .and_then(iana_zone)
                .or_else(|| iana_zone(&tzid))
                .map(Zone::Named)
                .or_else(|| {
                    CustomZone::from_vtimezone(&tzid, node, until)
                        .map(|custom| Zone::Custom(Arc::new(custom)))
                });
            if let Some(zone) = zone {
                debug!(tzid = %tzid, zone = zone.name(), "Registered embedded timezone");
                zones.insert(tzid, zone);
            }
        }
        Self { zones }
    }

    /// Resolves a TZID; `None` when neither embedded nor IANA.
    pub fn resolve(&self, tzid: &str) -> Option<Zone> {
        let tzid = tzid.trim().trim_matches('"');
        if let Some(zone) = self.zones.get(tzid) {
            return Some(zone.clone());
        }
        if tzid.eq_ignore_ascii_case("UTC") || tzid.eq_ignore_ascii_case("Z") {
            return Some(Zone::Utc);
        }
        iana_zone(tzid).map(Zone::Named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::component::read_components;
    use chrono::NaiveDate;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn until() -> NaiveDateTime {
        local(2030, 1, 1, 0, 0)
    }

    const CUSTOM_TZ: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Custom Eastern\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19701101T020000\r\n\
RRULE:FREQ=YEARLY;BYMONTH=11;BYDAY=1SU\r\n\
TZOFFSETFROM:-0400\r\n\
TZOFFSETTO:-0500\r\n\
END:STANDARD\r\n\
BEGIN:DAYLIGHT\r\n\
DTSTART:19700308T020000\r\n\
RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=2SU\r\n\
TZOFFSETFROM:-0500\r\n\
TZOFFSETTO:-0400\r\n\
END:DAYLIGHT\r\n\
END:VTIMEZONE\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn iana_names_and_paths() {
        assert_eq!(iana_zone("Europe/Paris"), Some(chrono_tz::Europe::Paris));
        assert_eq!(
            iana_zone("/mozilla.org/20070129_1/Europe/Paris"),
            Some(chrono_tz::Europe::Paris)
        );
        assert_eq!(iana_zone("Eastern Standard Time"), None);
    }

    #[test]
    fn named_zone_handles_dst() {
        let zone = Zone::Named(chrono_tz::America::New_York);
        // EST in January, EDT in July.
        assert_eq!(
            zone.to_utc(local(2024, 1, 15, 9, 0)),
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );
        assert_eq!(
            zone.to_utc(local(2024, 7, 15, 9, 0)),
            Utc.with_ymd_and_hms(2024, 7, 15, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn gap_shifts_forward_and_overlap_takes_earliest() {
        let zone = Zone::Named(chrono_tz::America::New_York);
        // 02:30 does not exist on 2024-03-10.
        assert_eq!(
            zone.to_utc(local(2024, 3, 10, 2, 30)),
            Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap()
        );
        // 01:30 happens twice on 2024-11-03; the first is EDT.
        assert_eq!(
            zone.to_utc(local(2024, 11, 3, 1, 30)),
            Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap()
        );
    }

    #[test]
    fn custom_vtimezone_rules() {
        let tree = read_components(CUSTOM_TZ);
        let registry = ZoneRegistry::from_components(&tree.components, until());
        let zone = registry.resolve("Custom Eastern").expect("zone registered");
        assert!(matches!(zone, Zone::Custom(_)));

        assert_eq!(
            zone.to_utc(local(2024, 1, 15, 9, 0)),
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );
        assert_eq!(
            zone.to_utc(local(2024, 7, 15, 9, 0)),
            Utc.with_ymd_and_hms(2024, 7, 15, 13, 0, 0).unwrap()
        );
        assert_eq!(
            zone.to_local(Utc.with_ymd_and_hms(2024, 7, 15, 13, 0, 0).unwrap()),
            local(2024, 7, 15, 9, 0)
        );
    }

    #[test]
    fn x_lic_location_wins() {
        let doc = CUSTOM_TZ.replace(
            "TZID:Custom Eastern\r\n",
            "TZID:Custom Eastern\r\nX-LIC-LOCATION:America/New_York\r\n",
        );
        let tree = read_components(&doc);
        let registry = ZoneRegistry::from_components(&tree.components, until());
        let zone = registry.resolve("Custom Eastern").unwrap();
        assert!(matches!(zone, Zone::Named(tz) if tz == chrono_tz::America::New_York));
    }

    #[test]
    fn unknown_tzid_is_unresolved() {
        let registry = ZoneRegistry::default();
        assert!(registry.resolve("Mars/Olympus_Mons").is_none());
        assert!(matches!(registry.resolve("UTC"), Some(Zone::Utc)));
        assert!(matches!(registry.resolve("Asia/Tokyo"), Some(Zone::Named(_))));
    }
}
