//! Windows during which the watchdog must not force a reconnect.
//!
//! Maintenance windows on the review server produce long quiet periods that
//! are not connection failures. Two kinds of window can be configured:
//!
//! - **Days of week**: numbered 1..=7 with 1 = Sunday
//! - **Times of day**: inclusive `hh:mm-hh:mm` spans in local time
//!
//! An empty list never matches.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors parsing exception windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("time should be in hh:mm format: {0}")]
    Format(String),

    #[error("hour should be in 24 hour format: {0}")]
    Hour(u32),

    #[error("there are 60 minutes in an hour: {0}")]
    Minute(u32),

    #[error("span start {from} should be before its end {to}")]
    EmptySpan { from: TimeOfDay, to: TimeOfDay },

    #[error("day of week should be 1 (Sunday) to 7 (Saturday): {0}")]
    DayOfWeek(String),
}

/// A wall-clock time with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, TimeParseError> {
        if hour > 23 {
            return Err(TimeParseError::Hour(hour));
        }
        if minute > 59 {
            return Err(TimeParseError::Minute(minute));
        }
        Ok(TimeOfDay { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        TimeOfDay {
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| TimeParseError::Format(s.to_string()))?;
        let hour = h
            .trim()
            .parse()
            .map_err(|_| TimeParseError::Format(s.to_string()))?;
        let minute = m
            .trim()
            .parse()
            .map_err(|_| TimeParseError::Format(s.to_string()))?;
        TimeOfDay::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// An inclusive `[from, to]` span within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSpan {
    from: TimeOfDay,
    to: TimeOfDay,
}

impl TimeSpan {
    /// `from` must be strictly before `to`.
    pub fn new(from: TimeOfDay, to: TimeOfDay) -> Result<Self, TimeParseError> {
        if from >= to {
            return Err(TimeParseError::EmptySpan { from, to });
        }
        Ok(TimeSpan { from, to })
    }

    pub fn from(&self) -> TimeOfDay {
        self.from
    }

    pub fn to(&self) -> TimeOfDay {
        self.to
    }

    /// Both ends are inclusive.
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.from <= time && time <= self.to
    }
}

impl FromStr for TimeSpan {
    type Err = TimeParseError;

    /// Parses `hh:mm-hh:mm`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('-')
            .ok_or_else(|| TimeParseError::Format(s.trim().to_string()))?;
        TimeSpan::new(from.parse()?, to.parse()?)
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Converts a 1 = Sunday day number into a weekday.
pub fn weekday_from_number(day: u32) -> Option<Weekday> {
    match day {
        1 => Some(Weekday::Sun),
        2 => Some(Weekday::Mon),
        3 => Some(Weekday::Tue),
        4 => Some(Weekday::Wed),
        5 => Some(Weekday::Thu),
        6 => Some(Weekday::Fri),
        7 => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parses a comma-separated list of 1 = Sunday day numbers.
pub fn parse_days_of_week(s: &str) -> Result<Vec<Weekday>, TimeParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse()
                .ok()
                .and_then(weekday_from_number)
                .ok_or_else(|| TimeParseError::DayOfWeek(d.to_string()))
        })
        .collect()
}

/// Parses a comma-separated list of `hh:mm-hh:mm` spans.
pub fn parse_time_spans(s: &str) -> Result<Vec<TimeSpan>, TimeParseError> {
    s.split(',')
        .map(str::trim)
        .filter(|span| !span.is_empty())
        .map(str::parse)
        .collect()
}

/// Days and times during which watchdog timeouts are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTimeExceptions {
    pub days_of_week: Vec<Weekday>,
    pub times_of_day: Vec<TimeSpan>,
}

impl WatchTimeExceptions {
    pub fn new(days_of_week: Vec<Weekday>, times_of_day: Vec<TimeSpan>) -> Self {
        WatchTimeExceptions {
            days_of_week,
            times_of_day,
        }
    }

    /// True if any window is configured.
    pub fn is_enabled(&self) -> bool {
        !self.days_of_week.is_empty() || !self.times_of_day.is_empty()
    }

    pub fn is_exception_day(&self, day: Weekday) -> bool {
        self.days_of_week.contains(&day)
    }

    pub fn is_exception_time(&self, time: TimeOfDay) -> bool {
        self.times_of_day.iter().any(|span| span.contains(time))
    }

    /// True if `at` falls on an excepted day or inside an excepted span.
    pub fn is_exception_at(&self, at: NaiveDateTime) -> bool {
        self.is_exception_day(at.weekday()) || self.is_exception_time(at.time().into())
    }

    pub fn is_exception_today(&self) -> bool {
        self.is_exception_day(Local::now().weekday())
    }

    pub fn is_exception_at_this_time(&self) -> bool {
        self.is_exception_time(Local::now().time().into())
    }

    pub fn is_exception_now(&self) -> bool {
        self.is_exception_at(Local::now().naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn at(date: (i32, u32, u32), time: (u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(time.0, time.1, 0)
            .unwrap()
    }

    // ─── Parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn parses_time_of_day() {
        assert_eq!(t("08:05"), TimeOfDay::new(8, 5).unwrap());
        assert_eq!(t(" 23:59 ").to_string(), "23:59");
    }

    #[test]
    fn rejects_bad_times() {
        assert_eq!("24:00".parse::<TimeOfDay>(), Err(TimeParseError::Hour(24)));
        assert_eq!("10:60".parse::<TimeOfDay>(), Err(TimeParseError::Minute(60)));
        assert!(matches!("1000".parse::<TimeOfDay>(), Err(TimeParseError::Format(_))));
        assert!(matches!("aa:bb".parse::<TimeOfDay>(), Err(TimeParseError::Format(_))));
    }

    #[test]
    fn span_requires_from_before_to() {
        assert!(TimeSpan::new(t("10:00"), t("10:00")).is_err());
        assert!(TimeSpan::new(t("11:00"), t("10:00")).is_err());
        assert!(TimeSpan::new(t("10:00"), t("10:01")).is_ok());
    }

    #[test]
    fn parses_span_lists() {
        let spans = parse_time_spans("08:00-09:30, 12:00-13:00").unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].to_string(), "12:00-13:00");
        assert!(parse_time_spans("").unwrap().is_empty());
        assert!(parse_time_spans("08:00").is_err());
    }

    #[test]
    fn parses_day_lists_with_sunday_first() {
        assert_eq!(
            parse_days_of_week("1, 7").unwrap(),
            vec![Weekday::Sun, Weekday::Sat]
        );
        assert!(parse_days_of_week("0").is_err());
        assert!(parse_days_of_week("8").is_err());
        assert!(parse_days_of_week("").unwrap().is_empty());
    }

    // ─── Matching ─────────────────────────────────────────────────────────────

    #[test]
    fn span_is_inclusive_at_both_ends() {
        let span = TimeSpan::new(t("08:00"), t("09:00")).unwrap();
        assert!(span.contains(t("08:00")));
        assert!(span.contains(t("08:30")));
        assert!(span.contains(t("09:00")));
        assert!(!span.contains(t("07:59")));
        assert!(!span.contains(t("09:01")));
    }

    #[test]
    fn empty_exceptions_never_match() {
        let none = WatchTimeExceptions::default();
        assert!(!none.is_enabled());
        assert!(!none.is_exception_now());
        assert!(!none.is_exception_today());
        assert!(!none.is_exception_at_this_time());
    }

    #[test]
    fn day_exception_matches_weekday() {
        // 2024-06-02 was a Sunday.
        let sundays = WatchTimeExceptions::new(vec![Weekday::Sun], vec![]);
        assert!(sundays.is_exception_at(at((2024, 6, 2), (12, 0))));
        assert!(!sundays.is_exception_at(at((2024, 6, 3), (12, 0))));
    }

    #[test]
    fn time_exception_matches_any_day() {
        let lunch = WatchTimeExceptions::new(
            vec![],
            vec![TimeSpan::new(t("12:00"), t("13:00")).unwrap()],
        );
        assert!(lunch.is_exception_at(at((2024, 6, 3), (12, 0))));
        assert!(lunch.is_exception_at(at((2024, 6, 4), (13, 0))));
        assert!(!lunch.is_exception_at(at((2024, 6, 4), (13, 1))));
    }

    #[test]
    fn today_is_an_exception_when_listed() {
        let today = Local::now().weekday();
        let exceptions = WatchTimeExceptions::new(vec![today], vec![]);
        assert!(exceptions.is_exception_today());
    }

    proptest! {
        #[test]
        fn span_contains_matches_ordering(
            a in 0u32..1440, b in 0u32..1440, x in 0u32..1440,
        ) {
            prop_assume!(a < b);
            let from = TimeOfDay::new(a / 60, a % 60).unwrap();
            let to = TimeOfDay::new(b / 60, b % 60).unwrap();
            let time = TimeOfDay::new(x / 60, x % 60).unwrap();
            let span = TimeSpan::new(from, to).unwrap();
            prop_assert_eq!(span.contains(time), a <= x && x <= b);
        }
    }
}
