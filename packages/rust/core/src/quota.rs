//! Quota and scheduling gate.
//!
//! Pure decision functions; the caller supplies local wall-clock time and the
//! current day's succeeded count.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use jobpilot_shared::{TimeWindow, WeekdayPolicy};

/// Days searched ahead by [`next_allowed`].
const LOOKAHEAD_DAYS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DailyLimitReached,
    OutsideAllowedWindow,
    WeekdayRestricted,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyLimitReached => "daily_limit_reached",
            Self::OutsideAllowedWindow => "outside_allowed_window",
            Self::WeekdayRestricted => "weekday_restricted",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

fn in_windows(windows: &[TimeWindow], t: NaiveTime) -> bool {
    windows.is_empty() || windows.iter().any(|w| w.contains(t))
}

/// Decide whether one more application may be submitted at `now`.
///
/// Checks run in order: daily limit, weekday, window. A full quota therefore
/// always reports [`DenyReason::DailyLimitReached`].
pub fn decide(
    now: NaiveDateTime,
    today_count: u32,
    daily_limit: u32,
    windows: &[TimeWindow],
    weekdays: &WeekdayPolicy,
) -> Decision {
    if today_count >= daily_limit {
        Decision::Deny(DenyReason::DailyLimitReached)
    } else if !weekdays.allows(now.weekday()) {
        Decision::Deny(DenyReason::WeekdayRestricted)
    } else if !in_windows(windows, now.time()) {
        Decision::Deny(DenyReason::OutsideAllowedWindow)
    } else {
        Decision::Allow
    }
}

/// Earliest local time at or after `now` permitted by the windows and the
/// weekday policy. Ignores the daily limit.
pub fn next_allowed(
    now: NaiveDateTime,
    windows: &[TimeWindow],
    weekdays: &WeekdayPolicy,
) -> Option<NaiveDateTime> {
    (0..=LOOKAHEAD_DAYS).find_map(|offset| {
        let date = now.date() + Duration::days(offset);
        if !weekdays.allows(date.weekday()) {
            return None;
        }
        let from = if offset == 0 { now.time() } else { NaiveTime::MIN };
        if in_windows(windows, from) {
            return Some(date.and_time(from));
        }
        windows
            .iter()
            .map(|w| w.start)
            .filter(|start| *start > from)
            .min()
            .map(|start| date.and_time(start))
    })
}
