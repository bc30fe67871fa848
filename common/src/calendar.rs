// Day-of-month calendar expressions
//
// A `DayOfMonth` is a set of month-days described by an include mask and an
// exclude mask. Each mask holds standard flags (ordinal weekdays, first/last
// day, first/last weekday, first/last weekend day) plus a literal field for
// absolute day numbers. Expressions such as `AllDays-5th-FirstWeekday` are
// parsed left to right, with `+`/`|` as union and `-` as difference.

use crate::errors::ScheduleError;
use chrono::{Datelike, NaiveDate, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Number of ordinal slots per weekday: 1st, 2nd, 3rd, 4th and last.
const ORDINAL_SLOTS: u32 = 5;
const LAST_SLOT: u32 = 4;

const ORDINAL_MASK: u64 = (1 << 35) - 1;
const FIRST_DAY: u64 = 1 << 35;
const LAST_DAY: u64 = 1 << 36;
const FIRST_WEEKDAY: u64 = 1 << 37;
const LAST_WEEKDAY: u64 = 1 << 38;
const FIRST_WEEKEND_DAY: u64 = 1 << 39;
const LAST_WEEKEND_DAY: u64 = 1 << 40;
/// Gate for the absolute-day field; set whenever `days` is non-zero.
const ABSOLUTE_DAY: u64 = 1 << 41;

const WEEKDAYS_FROM_SUNDAY: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

const fn ordinal_bit(weekday_index: u32, slot: u32) -> u64 {
    1 << (weekday_index * ORDINAL_SLOTS + slot)
}

const fn weekday_bits(weekday_index: u32) -> u64 {
    0b11111 << (weekday_index * ORDINAL_SLOTS)
}

/// Occurrence of a weekday within its month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ordinal {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl Ordinal {
    pub const ALL: [Ordinal; 5] = [
        Ordinal::First,
        Ordinal::Second,
        Ordinal::Third,
        Ordinal::Fourth,
        Ordinal::Last,
    ];

    fn slot(self) -> u32 {
        match self {
            Ordinal::First => 0,
            Ordinal::Second => 1,
            Ordinal::Third => 2,
            Ordinal::Fourth => 3,
            Ordinal::Last => LAST_SLOT,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Ordinal::First => "First",
            Ordinal::Second => "Second",
            Ordinal::Third => "Third",
            Ordinal::Fourth => "Fourth",
            Ordinal::Last => "Last",
        }
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Number of days in the month containing `date`
pub fn days_in_month(date: NaiveDate) -> u32 {
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    next_month
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

/// Every standard flag satisfied by `date`.
fn date_signature(date: NaiveDate) -> u64 {
    let day = date.day();
    let dim = days_in_month(date);
    let weekday = date.weekday();
    let w = weekday.num_days_from_sunday();

    let mut signature = 0;

    let slot = (day - 1) / 7;
    if slot < LAST_SLOT {
        signature |= ordinal_bit(w, slot);
    }
    if day + 7 > dim {
        signature |= ordinal_bit(w, LAST_SLOT);
    }
    if day == 1 {
        signature |= FIRST_DAY;
    }
    if day == dim {
        signature |= LAST_DAY;
    }

    if is_weekend(weekday) {
        let first = match weekday {
            Weekday::Sat => day <= 6,
            _ => day == 1,
        };
        let last = match weekday {
            Weekday::Sat => day == dim,
            _ => day + 6 > dim,
        };
        if first {
            signature |= FIRST_WEEKEND_DAY;
        }
        if last {
            signature |= LAST_WEEKEND_DAY;
        }
    } else {
        // The 1st falling on a weekend pushes the first weekday to Monday 2nd/3rd.
        if day == 1 || (weekday == Weekday::Mon && day <= 3) {
            signature |= FIRST_WEEKDAY;
        }
        if day == dim || (weekday == Weekday::Fri && day + 2 >= dim) {
            signature |= LAST_WEEKDAY;
        }
    }

    signature
}

/// Closed-form test for a single standard flag.
fn single_flag_matches(flag: u64, date: NaiveDate) -> bool {
    let day = date.day();
    let weekday = date.weekday();

    if flag & ORDINAL_MASK != 0 {
        let index = flag.trailing_zeros();
        let (w, slot) = (index / ORDINAL_SLOTS, index % ORDINAL_SLOTS);
        if weekday.num_days_from_sunday() != w {
            return false;
        }
        return if slot == LAST_SLOT {
            day + 7 > days_in_month(date)
        } else {
            (day - 1) / 7 == slot
        };
    }

    match flag {
        FIRST_DAY => day == 1,
        LAST_DAY => day == days_in_month(date),
        _ => date_signature(date) & flag != 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
struct DayMask {
    flags: u64,
    /// Bit n set means literal day n + 1.
    days: u32,
}

impl DayMask {
    const EMPTY: DayMask = DayMask { flags: 0, days: 0 };

    const fn from_flags(flags: u64) -> Self {
        DayMask { flags, days: 0 }
    }

    fn absolute(day: u32) -> Self {
        DayMask {
            flags: ABSOLUTE_DAY,
            days: 1 << (day - 1),
        }
    }

    fn or(self, other: DayMask) -> Self {
        DayMask {
            flags: self.flags | other.flags,
            days: self.days | other.days,
        }
    }

    fn is_empty(&self) -> bool {
        self.flags == 0 && self.days == 0
    }

    fn standard_flags(&self) -> u64 {
        self.flags & !ABSOLUTE_DAY
    }

    fn absolute_matches(&self, date: NaiveDate) -> bool {
        self.flags & ABSOLUTE_DAY != 0 && self.days & (1 << (date.day() - 1)) != 0
    }

    fn matches(&self, date: NaiveDate) -> bool {
        if self.is_empty() {
            return false;
        }
        date_signature(date) & self.standard_flags() != 0 || self.absolute_matches(date)
    }
}

/// An immutable set of month-days built from named terms and set algebra.
///
/// Matching is `included && !excluded`: exclusion always wins.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DayOfMonth {
    include: DayMask,
    exclude: DayMask,
}

impl DayOfMonth {
    pub const EMPTY: DayOfMonth = DayOfMonth::from_flags(0);
    pub const ALL_DAYS: DayOfMonth = DayOfMonth::from_flags(ORDINAL_MASK);
    pub const ALL_WEEKDAYS: DayOfMonth = DayOfMonth::from_flags(
        weekday_bits(1) | weekday_bits(2) | weekday_bits(3) | weekday_bits(4) | weekday_bits(5),
    );
    pub const ALL_WEEKEND_DAYS: DayOfMonth =
        DayOfMonth::from_flags(weekday_bits(0) | weekday_bits(6));
    pub const FIRST_DAY: DayOfMonth = DayOfMonth::from_flags(FIRST_DAY);
    pub const LAST_DAY: DayOfMonth = DayOfMonth::from_flags(LAST_DAY);
    pub const FIRST_WEEKDAY: DayOfMonth = DayOfMonth::from_flags(FIRST_WEEKDAY);
    pub const LAST_WEEKDAY: DayOfMonth = DayOfMonth::from_flags(LAST_WEEKDAY);
    pub const FIRST_WEEKEND_DAY: DayOfMonth = DayOfMonth::from_flags(FIRST_WEEKEND_DAY);
    pub const LAST_WEEKEND_DAY: DayOfMonth = DayOfMonth::from_flags(LAST_WEEKEND_DAY);

    const fn from_flags(flags: u64) -> Self {
        DayOfMonth {
            include: DayMask::from_flags(flags),
            exclude: DayMask::EMPTY,
        }
    }

    /// The `ordinal` occurrence of `weekday`, e.g. the last Friday
    pub fn nth(ordinal: Ordinal, weekday: Weekday) -> Self {
        Self::from_flags(ordinal_bit(weekday.num_days_from_sunday(), ordinal.slot()))
    }

    /// Every occurrence of `weekday`
    pub fn every(weekday: Weekday) -> Self {
        Self::from_flags(weekday_bits(weekday.num_days_from_sunday()))
    }

    /// The literal day-of-month `day` (1..=31)
    pub fn day(day: u32) -> Option<Self> {
        (1..=31).contains(&day).then(|| DayOfMonth {
            include: DayMask::absolute(day),
            exclude: DayMask::EMPTY,
        })
    }

    pub fn union(self, other: DayOfMonth) -> Self {
        DayOfMonth {
            include: self.include.or(other.include),
            exclude: self.exclude.or(other.exclude),
        }
    }

    pub fn difference(self, other: DayOfMonth) -> Self {
        DayOfMonth {
            include: self.include,
            exclude: self.exclude.or(other.include),
        }
    }

    /// Every day not included by `self`. Days `self` excludes are not re-admitted.
    pub fn complement(self) -> Self {
        DayOfMonth {
            include: Self::ALL_DAYS.include,
            exclude: self.include,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        if let Some(result) = self.fast_match(date) {
            return result;
        }
        self.include.matches(date) && !self.exclude.matches(date)
    }

    /// Shortcut for values that are exactly one standard flag.
    fn fast_match(&self, date: NaiveDate) -> Option<bool> {
        let flags = self.include.flags;
        if !self.exclude.is_empty() || self.include.days != 0 || !flags.is_power_of_two() {
            return None;
        }
        Some(single_flag_matches(flags, date))
    }

    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();
        let invalid = |token: &str| ScheduleError::InvalidDayOfMonth {
            expression: expression.to_string(),
            token: token.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid(""));
        }

        let mut result = DayOfMonth::EMPTY;
        let mut op = Operator::Union;
        let mut start = 0;
        let mut first = true;

        let apply = |result: DayOfMonth,
                     op: Operator,
                     token: &str,
                     first: bool|
         -> Result<DayOfMonth, ScheduleError> {
            let token = token.trim();
            if token.is_empty() && first {
                return Ok(result);
            }
            let term = lookup_term(token).ok_or_else(|| invalid(token))?;
            Ok(match op {
                Operator::Union => result.union(term),
                Operator::Difference => result.difference(term),
            })
        };

        for (index, c) in trimmed.char_indices() {
            if let Some(next) = Operator::from_char(c) {
                result = apply(result, op, &trimmed[start..index], first)?;
                first = false;
                op = next;
                start = index + c.len_utf8();
            }
        }
        apply(result, op, &trimmed[start..], first)
    }
}

#[derive(Debug, Clone, Copy)]
enum Operator {
    Union,
    Difference,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' | '|' => Some(Operator::Union),
            '-' => Some(Operator::Difference),
            _ => None,
        }
    }
}

lazy_static! {
    static ref LITERAL_DAY: Regex = Regex::new(r"(?i)^(\d{1,2})(st|nd|rd|th)$").unwrap();

    /// Named terms in the order `Display` tries them: composites first.
    static ref NAMED_TERMS: Vec<(String, DayOfMonth)> = {
        let mut terms = vec![
            ("AllDays".to_string(), DayOfMonth::ALL_DAYS),
            ("AllWeekdays".to_string(), DayOfMonth::ALL_WEEKDAYS),
            ("AllWeekendDays".to_string(), DayOfMonth::ALL_WEEKEND_DAYS),
        ];
        for weekday in WEEKDAYS_FROM_SUNDAY {
            terms.push((format!("All{}s", weekday_name(weekday)), DayOfMonth::every(weekday)));
        }
        for weekday in WEEKDAYS_FROM_SUNDAY {
            for ordinal in Ordinal::ALL {
                terms.push((
                    format!("{}{}", ordinal.name(), weekday_name(weekday)),
                    DayOfMonth::nth(ordinal, weekday),
                ));
            }
        }
        terms.extend([
            ("FirstDay".to_string(), DayOfMonth::FIRST_DAY),
            ("LastDay".to_string(), DayOfMonth::LAST_DAY),
            ("FirstWeekday".to_string(), DayOfMonth::FIRST_WEEKDAY),
            ("LastWeekday".to_string(), DayOfMonth::LAST_WEEKDAY),
            ("FirstWeekendDay".to_string(), DayOfMonth::FIRST_WEEKEND_DAY),
            ("LastWeekendDay".to_string(), DayOfMonth::LAST_WEEKEND_DAY),
        ]);
        terms
    };

    static ref TERMS_BY_NAME: HashMap<String, DayOfMonth> = {
        let mut map: HashMap<String, DayOfMonth> = NAMED_TERMS
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), *value))
            .collect();
        map.insert("empty".to_string(), DayOfMonth::EMPTY);
        map
    };
}

/// Every named term, e.g. for listing accepted tokens
pub fn named_terms() -> impl Iterator<Item = (&'static str, DayOfMonth)> {
    NAMED_TERMS
        .iter()
        .map(|(name, value)| (name.as_str(), *value))
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn lookup_term(token: &str) -> Option<DayOfMonth> {
    if let Some(term) = TERMS_BY_NAME.get(&token.to_ascii_lowercase()) {
        return Some(*term);
    }
    let captures = LITERAL_DAY.captures(token)?;
    let day: u32 = captures[1].parse().ok()?;
    if !captures[2].eq_ignore_ascii_case(ordinal_suffix(day)) {
        return None;
    }
    DayOfMonth::day(day)
}

/// Decompose a mask into named terms, largest composites first.
fn mask_terms(mask: DayMask) -> Vec<String> {
    let mut remaining = mask.standard_flags();
    let mut terms = Vec::new();
    for (name, value) in NAMED_TERMS.iter() {
        let bits = value.include.flags;
        if remaining & bits == bits {
            terms.push(name.clone());
            remaining &= !bits;
        }
        if remaining == 0 {
            break;
        }
    }
    for day in 1..=31u32 {
        if mask.days & (1 << (day - 1)) != 0 {
            terms.push(format!("{}{}", day, ordinal_suffix(day)));
        }
    }
    terms
}

impl fmt::Display for DayOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let include = mask_terms(self.include);
        if include.is_empty() {
            f.write_str("Empty")?;
        } else {
            f.write_str(&include.join("|"))?;
        }
        for term in mask_terms(self.exclude) {
            write!(f, "-{}", term)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DayOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DayOfMonth({})", self)
    }
}

impl FromStr for DayOfMonth {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayOfMonth::parse(s)
    }
}

impl Serialize for DayOfMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayOfMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DayOfMonth::parse(&s).map_err(serde::de::Error::custom)
    }
}
