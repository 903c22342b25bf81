//! RRULE expansion bounded by the expansion window.
//!
//! Rules are evaluated against the wall-clock DTSTART (written as if it
//! were UTC) so that BYHOUR, BYDAY and friends follow local time across
//! DST changes. Each generated wall-clock time is then converted to an
//! instant through the event's zone.

use calhub_core::TimeWindow;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use rrule::RRuleSet;
use tracing::warn;

use super::timezone::Zone;
use super::value::{IcalTime, parse_time};

/// Failure to interpret a recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceError(pub String);

impl std::fmt::Display for RecurrenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recurring series to expand.
#[derive(Debug)]
pub struct Series<'a> {
    /// RRULE value.
    pub rule: &'a str,
    /// Wall-clock DTSTART.
    pub start: NaiveDateTime,
    /// Zone the wall-clock times belong to.
    pub zone: &'a Zone,
    /// Whether DTSTART is a DATE.
    pub all_day: bool,
    /// Length of each occurrence, used to catch instances straddling the
    /// window start.
    pub duration: Duration,
}

/// Most occurrences a single series expands to.
pub const MAX_OCCURRENCES: u16 = u16::MAX;

/// Expanded occurrences of one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Sorted occurrence starts that may overlap the window.
    pub starts: Vec<DateTime<Utc>>,
    /// The series hit [`MAX_OCCURRENCES`]; later occurrences are missing.
    pub truncated: bool,
}

/// Occurrence start instants of `series` that may overlap `window`.
///
/// Callers still apply the exact overlap check.
pub fn expand(series: &Series<'_>, window: &TimeWindow) -> Result<Expansion, RecurrenceError> {
    let rule = wall_clock_rule(series)?;
    let text = format!(
        "DTSTART:{}Z\nRRULE:{}",
        series.start.format("%Y%m%dT%H%M%S"),
        rule
    );
    let set = text
        .parse::<RRuleSet>()
        .map_err(|e| RecurrenceError(format!("invalid RRULE '{}': {e}", series.rule)))?;

    // Offsets never exceed a day, so one day of padding on each side is
    // enough to translate the window into wall-clock time.
    let padded = window.widened(Duration::days(1));
    let after = padded
        .start
        .checked_sub_signed(series.duration)
        .unwrap_or(padded.start);

    let tz: rrule::Tz = Utc.into();
    let result = set
        .after(after.with_timezone(&tz))
        .before(padded.end.with_timezone(&tz))
        .all(MAX_OCCURRENCES);
    if result.limited {
        warn!(rule = %series.rule, "Recurrence expansion hit the occurrence limit");
    }

    let mut starts: Vec<DateTime<Utc>> = result
        .dates
        .iter()
        .map(|d| {
            if series.all_day {
                d.naive_utc().and_utc()
            } else {
                series.zone.to_utc(d.naive_utc())
            }
        })
        .collect();
    starts.sort();
    starts.dedup();
    Ok(Expansion {
        starts,
        truncated: result.limited,
    })
}

/// Rewrites UNTIL to the same wall-clock-as-UTC form as DTSTART.
fn wall_clock_rule(series: &Series<'_>) -> Result<String, RecurrenceError> {
    let mut parts = Vec::new();
    for part in series.rule.trim().split(';').filter(|p| !p.trim().is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            return Err(RecurrenceError(format!("malformed RRULE part '{part}'")));
        };
        if !key.trim().eq_ignore_ascii_case("UNTIL") {
            parts.push(part.trim().to_string());
            continue;
        }

        let until = parse_time(value, None, None)
            .map_err(|e| RecurrenceError(format!("invalid UNTIL: {e}")))?;
        let wall = match until {
            IcalTime::Utc(utc) if !series.all_day => series.zone.to_local(utc.and_utc()),
            IcalTime::Date(date) if !series.all_day => {
                // A date UNTIL on a timed series includes that whole day.
                date.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::seconds(1)
            }
            other => other.naive(),
        };
        parts.push(format!("UNTIL={}", wall.format("%Y%m%dT%H%M%SZ")));
    }
    if parts.is_empty() {
        return Err(RecurrenceError("empty RRULE".into()));
    }
    Ok(parts.join(";"))
}
