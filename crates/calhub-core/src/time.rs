//! Expansion window used to bound recurring events.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window from two bounds, in either order.
    pub fn new(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Window reaching `lookbehind_months` into the past and
    /// `lookahead_months` into the future of `now`.
    pub fn around(now: DateTime<Utc>, lookbehind_months: u32, lookahead_months: u32) -> Self {
        let start = now
            .checked_sub_months(Months::new(lookbehind_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = now
            .checked_add_months(Months::new(lookahead_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(start, end)
    }

    /// Whether the instant falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// Whether an event spanning `[start, end)` intersects the window.
    ///
    /// Zero-length events count when their start is inside the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start >= self.end {
            return false;
        }
        end > self.start || start >= self.start
    }

    /// Same window with `margin` added on both sides.
    pub fn widened(&self, margin: Duration) -> Self {
        Self {
            start: self.start.checked_sub_signed(margin).unwrap_or(self.start),
            end: self.end.checked_add_signed(margin).unwrap_or(self.end),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
