// Closed intervals over dates and times of day

use crate::errors::ScheduleError;
use crate::format::{
    format_date, format_datetime, format_time, is_zero, parse_date, parse_datetime, parse_time,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;

const RANGE_SEPARATOR: &str = " - ";

/// A closed date window. `stop == None` leaves the end unbounded.
///
/// Ranges built from bare dates ignore the time of day: both the stored
/// bounds and any compared value are truncated to midnight, so the stop date
/// is included in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDateTime,
    stop: Option<NaiveDateTime>,
    ignore_time: bool,
}

impl DateRange {
    pub fn new(start: NaiveDate, stop: Option<NaiveDate>) -> Result<Self, ScheduleError> {
        Self::build(
            start.and_time(NaiveTime::MIN),
            stop.map(|d| d.and_time(NaiveTime::MIN)),
            true,
        )
    }

    /// A range that keeps the time of day on both bounds
    pub fn with_time(
        start: NaiveDateTime,
        stop: Option<NaiveDateTime>,
    ) -> Result<Self, ScheduleError> {
        Self::build(start, stop, false)
    }

    fn build(
        start: NaiveDateTime,
        stop: Option<NaiveDateTime>,
        ignore_time: bool,
    ) -> Result<Self, ScheduleError> {
        if let Some(stop) = stop {
            if stop < start {
                return Err(ScheduleError::InvalidDateRange(format!(
                    "stop {} precedes start {}",
                    format_datetime(stop),
                    format_datetime(start)
                )));
            }
        }
        Ok(Self {
            start,
            stop,
            ignore_time,
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn stop(&self) -> Option<NaiveDateTime> {
        self.stop
    }

    pub fn is_bounded(&self) -> bool {
        self.stop.is_some()
    }

    pub fn ignores_time(&self) -> bool {
        self.ignore_time
    }

    fn normalize(&self, at: NaiveDateTime) -> NaiveDateTime {
        if self.ignore_time {
            at.date().and_time(NaiveTime::MIN)
        } else {
            at
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let at = self.normalize(at);
        self.start <= at && self.stop.map_or(true, |stop| at <= stop)
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.contains(date.and_time(NaiveTime::MIN))
    }

    /// True once `now` lies beyond a bounded stop
    pub fn has_ended(&self, now: NaiveDateTime) -> bool {
        let now = self.normalize(now);
        self.stop.is_some_and(|stop| now > stop)
    }

    /// The overlap of two ranges, or `None` when they are disjoint
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let stop = match (self.stop, other.stop) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if stop.is_some_and(|stop| stop < start) {
            return None;
        }
        Some(DateRange {
            start,
            stop,
            ignore_time: self.ignore_time && other.ignore_time,
        })
    }

    /// The smallest range covering both, including any gap between them
    pub fn union(&self, other: &DateRange) -> DateRange {
        let stop = match (self.stop, other.stop) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        DateRange {
            start: self.start.min(other.start),
            stop,
            ignore_time: self.ignore_time && other.ignore_time,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |at: NaiveDateTime| {
            if self.ignore_time {
                format_date(at.date())
            } else {
                format_datetime(at)
            }
        };
        f.write_str(&render(self.start))?;
        if let Some(stop) = self.stop {
            write!(f, "{}{}", RANGE_SEPARATOR, render(stop))?;
        }
        Ok(())
    }
}

impl FromStr for DateRange {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidDateRange(s.to_string());
        let (start_part, stop_part) = match s.split_once(RANGE_SEPARATOR) {
            Some((start, stop)) => (start, Some(stop)),
            None => (s, None),
        };

        let parse_bound = |part: &str| -> Result<(NaiveDateTime, bool), ScheduleError> {
            if let Some(date) = parse_date(part) {
                return Ok((date.and_time(NaiveTime::MIN), true));
            }
            parse_datetime(part)
                .map(|at| (at, false))
                .ok_or_else(invalid)
        };

        let (start, start_is_date) = parse_bound(start_part)?;
        let stop = match stop_part.map(str::trim) {
            None | Some("") => None,
            Some(part) => Some(parse_bound(part)?),
        };
        // A zero stop means "no end"
        let stop = stop.filter(|(at, _)| !is_zero(*at));

        let ignore_time = start_is_date && stop.map_or(true, |(_, is_date)| is_date);
        DateRange::build(start, stop.map(|(at, _)| at), ignore_time)
    }
}

/// A window within a day. `stop == None` runs to the end of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: NaiveTime,
    stop: Option<NaiveTime>,
}

impl TimeRange {
    pub fn new(start: NaiveTime, stop: Option<NaiveTime>) -> Result<Self, ScheduleError> {
        if let Some(stop) = stop {
            if stop < start {
                return Err(ScheduleError::InvalidTimeRange(format!(
                    "stop {} precedes start {}",
                    format_time(stop),
                    format_time(start)
                )));
            }
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn stop(&self) -> Option<NaiveTime> {
        self.stop
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && self.stop.map_or(true, |stop| time <= stop)
    }

    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let start = self.start.max(other.start);
        let stop = match (self.stop, other.stop) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if stop.is_some_and(|stop| stop < start) {
            return None;
        }
        Some(TimeRange { start, stop })
    }

    pub fn union(&self, other: &TimeRange) -> TimeRange {
        let stop = match (self.stop, other.stop) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        TimeRange {
            start: self.start.min(other.start),
            stop,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_time(self.start))?;
        if let Some(stop) = self.stop {
            write!(f, "{}{}", RANGE_SEPARATOR, format_time(stop))?;
        }
        Ok(())
    }
}

impl FromStr for TimeRange {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTimeRange(s.to_string());
        let (start_part, stop_part) = match s.split_once('-') {
            Some((start, stop)) => (start, Some(stop)),
            None => (s, None),
        };
        let start = parse_time(start_part).ok_or_else(invalid)?;
        let stop = match stop_part.map(str::trim) {
            None | Some("") => None,
            Some(part) => Some(parse_time(part).ok_or_else(invalid)?),
        };
        // Midnight as a stop means "no end"
        let stop = stop.filter(|t| *t != NaiveTime::MIN);
        TimeRange::new(start, stop)
    }
}
