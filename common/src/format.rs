// Wire formats for dates, times and durations stored in schedule settings

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const DATE_FORMAT: &str = "%m/%d/%Y";
pub const DATETIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
pub const TIME_FORMAT: &str = "%I:%M:%S %p";

/// The "never" timestamp written for an unset lifecycle field.
pub const ZERO_TIMESTAMP: &str = "01/01/0001 12:00:00 AM";

const DATE_FORMATS: &[&str] = &[DATE_FORMAT, "%Y-%m-%d"];
const DATETIME_FORMATS: &[&str] = &[
    DATETIME_FORMAT,
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];
const TIME_FORMATS: &[&str] = &[TIME_FORMAT, "%I:%M %p", "%H:%M:%S", "%H:%M"];

/// The zero sentinel as a value, `0001-01-01 00:00:00`
pub fn zero_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

pub fn is_zero(value: NaiveDateTime) -> bool {
    value == zero_datetime()
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a timestamp; a bare date is taken as midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Parse `hh:mm[:ss]`, optionally prefixed by a day count as `d.hh:mm:ss`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (days, clock) = match s.split_once('.') {
        Some((days, rest)) if rest.contains(':') => (days.parse::<i64>().ok()?, rest),
        _ => (0, s),
    };

    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.trim().parse().ok()?;
    let minutes: i64 = parts.next()?.trim().parse().ok()?;
    let seconds: i64 = match parts.next() {
        Some(sec) => sec.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || days < 0 || hours < 0 || !(0..60).contains(&minutes) {
        return None;
    }
    if !(0..60).contains(&seconds) {
        return None;
    }

    Some(
        Duration::days(days)
            + Duration::hours(hours)
            + Duration::minutes(minutes)
            + Duration::seconds(seconds),
    )
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{}.{:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Seconds elapsed since `since` on a 24-hour dial, wrapping at midnight.
pub fn seconds_past(now: NaiveTime, since: NaiveTime) -> i64 {
    let diff = now.num_seconds_from_midnight() as i64 - since.num_seconds_from_midnight() as i64;
    diff.rem_euclid(86_400)
}
