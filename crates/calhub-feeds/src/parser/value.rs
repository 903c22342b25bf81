//! Property value decoding: date-times, durations, UTC offsets and text.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// A DATE or DATE-TIME value as written in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcalTime {
    /// `VALUE=DATE`, `YYYYMMDD`.
    Date(NaiveDate),
    /// `YYYYMMDDTHHMMSSZ`.
    Utc(NaiveDateTime),
    /// No zone information.
    Floating(NaiveDateTime),
    /// Local time with a `TZID` parameter.
    Zoned { local: NaiveDateTime, tzid: String },
}

impl IcalTime {
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Wall-clock reading of the value, midnight for dates.
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            Self::Date(date) => date.and_time(NaiveTime::MIN),
            Self::Utc(dt) | Self::Floating(dt) => *dt,
            Self::Zoned { local, .. } => *local,
        }
    }

    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Zoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }
}

/// Parses a single DATE or DATE-TIME.
///
/// `value_type` is the `VALUE` parameter, `tzid` the `TZID` parameter.
pub fn parse_time(raw: &str, tzid: Option<&str>, value_type: Option<&str>) -> Result<IcalTime, String> {
    let raw = raw.trim();
    let is_date = value_type.is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()));

    if is_date {
        let date = raw.get(..8).unwrap_or(raw);
        return NaiveDate::parse_from_str(date, "%Y%m%d")
            .map(IcalTime::Date)
            .map_err(|e| format!("invalid date '{raw}': {e}"));
    }

    let (body, utc) = match raw.strip_suffix('Z').or_else(|| raw.strip_suffix('z')) {
        Some(body) => (body, true),
        None => (raw, false),
    };

    let local = NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(body, "%Y%m%dT%H%M"))
        .map_err(|e| format!("invalid date-time '{raw}': {e}"))?;

    Ok(match (utc, tzid) {
        (true, _) => IcalTime::Utc(local),
        (false, Some(tzid)) if !tzid.trim().is_empty() => IcalTime::Zoned {
            local,
            tzid: tzid.trim().to_string(),
        },
        (false, _) => IcalTime::Floating(local),
    })
}

/// Parses a comma-separated list (EXDATE, RDATE). Period values are skipped.
pub fn parse_time_list(
    raw: &str,
    tzid: Option<&str>,
    value_type: Option<&str>,
) -> Vec<Result<IcalTime, String>> {
    if value_type.is_some_and(|v| v.eq_ignore_ascii_case("PERIOD")) {
        return raw
            .split(',')
            .filter_map(|period| period.split('/').next())
            .filter(|start| !start.trim().is_empty())
            .map(|start| parse_time(start, tzid, None))
            .collect();
    }
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_time(part, tzid, value_type))
        .collect()
}

/// Parses a non-negative ISO 8601 duration (`PT1H30M`, `P1D`, `P2W`).
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Err(format!("negative duration '{raw}'"));
    }
    let raw = raw.trim_start_matches('+');
    let parsed = iso8601::duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))?;
    let std_duration: std::time::Duration = parsed.into();
    Duration::from_std(std_duration).map_err(|e| format!("duration out of range '{raw}': {e}"))
}

/// Parses a UTC offset (`+0530`, `-0800`, `+013045`) into seconds east of UTC.
pub fn parse_utc_offset(raw: &str) -> Result<i32, String> {
    let raw = raw.trim();
    let (sign, digits) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(format!("invalid UTC offset '{raw}'")),
    };
    if !(digits.len() == 4 || digits.len() == 6) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid UTC offset '{raw}'"));
    }
    let field = |range: std::ops::Range<usize>| digits[range].parse::<i32>().unwrap_or(0);
    let hours = field(0..2);
    let minutes = field(2..4);
    let seconds = if digits.len() == 6 { field(4..6) } else { 0 };
    Ok(sign * (hours * 3600 + minutes * 60 + seconds))
}

/// Undoes TEXT escaping (`\,` `\;` `\\` `\n`).
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
