//! Scheduling primitives: allowed time windows and weekday policies.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{JobPilotError, Result};

/// A local wall-clock window `[start, end)`. Wraps past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse `"HH:MM"` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| JobPilotError::config(format!("invalid time '{s}' (expected HH:MM): {e}")))
}

/// Which days of the week applications may be sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeekdayPolicy {
    #[default]
    Any,
    WeekdaysOnly,
    Only(Vec<Weekday>),
}

impl WeekdayPolicy {
    pub fn allows(&self, day: Weekday) -> bool {
        match self {
            Self::Any => true,
            Self::WeekdaysOnly => !matches!(day, Weekday::Sat | Weekday::Sun),
            Self::Only(days) => days.contains(&day),
        }
    }
}

/// Parse a day name like `"mon"` or `"Monday"`.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| JobPilotError::config(format!("invalid weekday '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let w = TimeWindow::parse("09:00", "11:00").unwrap();
        assert!(w.contains(t(9, 0)));
        assert!(w.contains(t(10, 59)));
        assert!(!w.contains(t(11, 0)));
        assert!(!w.contains(t(8, 59)));
    }

    #[test]
    fn window_wraps_midnight() {
        let w = TimeWindow::parse("22:00", "02:00").unwrap();
        assert!(w.contains(t(23, 30)));
        assert!(w.contains(t(1, 0)));
        assert!(!w.contains(t(2, 0)));
        assert!(!w.contains(t(12, 0)));
    }

    #[test]
    fn rejects_bad_times() {
        assert!(TimeWindow::parse("25:00", "26:00").is_err());
        assert!(TimeWindow::parse("nine", "11:00").is_err());
    }

    #[test]
    fn weekday_policies() {
        assert!(WeekdayPolicy::Any.allows(Weekday::Sun));
        assert!(WeekdayPolicy::WeekdaysOnly.allows(Weekday::Fri));
        assert!(!WeekdayPolicy::WeekdaysOnly.allows(Weekday::Sat));
        let only = WeekdayPolicy::Only(vec![Weekday::Tue, Weekday::Thu]);
        assert!(only.allows(Weekday::Thu));
        assert!(!only.allows(Weekday::Mon));
        assert_eq!(parse_weekday("Wednesday").unwrap(), Weekday::Wed);
        assert_eq!(parse_weekday("fri").unwrap(), Weekday::Fri);
        assert!(parse_weekday("funday").is_err());
    }
}
