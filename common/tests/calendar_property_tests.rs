// Property-based tests for calendar expressions and date/time ranges
// Feature: calendar-scheduler

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use common::calendar::{days_in_month, named_terms, DayOfMonth, Ordinal};
use common::range::{DateRange, TimeRange};
use proptest::prelude::*;

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    // 1990-01-01 through roughly 2080
    (0i64..33_000).prop_map(|offset| {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(offset)
    })
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn arb_weekday() -> impl Strategy<Value = Weekday> {
    (0usize..7).prop_map(|n| WEEKDAYS[n])
}

fn is_first_weekday_of_month(date: NaiveDate) -> bool {
    let mut probe = date.with_day(1).unwrap();
    while matches!(probe.weekday(), Weekday::Sat | Weekday::Sun) {
        probe = probe.succ_opt().unwrap();
    }
    probe == date
}

/// **Feature: calendar-scheduler, Property 1: AllDays and Empty bracket every date**
///
/// *For any* date, `AllDays` matches and `Empty` does not.
#[test]
fn property_all_days_and_empty() {
    let all = DayOfMonth::parse("AllDays").unwrap();
    let empty = DayOfMonth::parse("Empty").unwrap();
    proptest!(|(date in arb_date())| {
        prop_assert!(all.matches(date), "AllDays should match {}", date);
        prop_assert!(!empty.matches(date), "Empty should not match {}", date);
    });
}

/// **Feature: calendar-scheduler, Property 2: First weekday occurrence**
///
/// *For any* date, `FirstMonday` matches exactly the Mondays in days 1 through 7.
#[test]
fn property_first_monday() {
    let spec = DayOfMonth::parse("FirstMonday").unwrap();
    proptest!(|(date in arb_date())| {
        let expected = date.weekday() == Weekday::Mon && date.day() <= 7;
        prop_assert_eq!(spec.matches(date), expected, "date {}", date);
    });
}

/// **Feature: calendar-scheduler, Property 3: Last weekday occurrence**
///
/// *For any* date, `LastFriday` matches exactly the Fridays whose next week
/// falls in the following month.
#[test]
fn property_last_friday() {
    let spec = DayOfMonth::parse("LastFriday").unwrap();
    proptest!(|(date in arb_date())| {
        let next_week = date + Duration::days(7);
        let expected = date.weekday() == Weekday::Fri && next_week.month() != date.month();
        prop_assert_eq!(spec.matches(date), expected, "date {}", date);
    });
}

/// **Feature: calendar-scheduler, Property 4: Exclusions win over inclusions**
///
/// *For any* date, `AllDays-5th-FirstWeekday` is false on the 5th and on the
/// month's first weekday, true otherwise.
#[test]
fn property_difference_excludes_terms() {
    let spec = DayOfMonth::parse("AllDays-5th-FirstWeekday").unwrap();
    proptest!(|(date in arb_date())| {
        let expected = date.day() != 5 && !is_first_weekday_of_month(date);
        prop_assert_eq!(spec.matches(date), expected, "date {}", date);
    });
}

/// **Feature: calendar-scheduler, Property 5: Named terms survive formatting**
///
/// *For every* named term, parsing its formatted text yields the same value.
#[test]
fn property_named_terms_round_trip() {
    for (name, value) in named_terms() {
        let formatted = value.to_string();
        assert_eq!(
            DayOfMonth::parse(&formatted).unwrap(),
            value,
            "{} formatted as {}",
            name,
            formatted
        );
        assert_eq!(DayOfMonth::parse(name).unwrap(), value, "term {}", name);
    }
}

/// **Feature: calendar-scheduler, Property 6: Literal days match their day of month**
#[test]
fn property_literal_day_matches() {
    proptest!(|(date in arb_date(), day in 1u32..=31)| {
        let spec = DayOfMonth::day(day).unwrap();
        prop_assert_eq!(spec.matches(date), date.day() == day);
    });
}

/// **Feature: calendar-scheduler, Property 7: Set algebra agrees with boolean logic**
///
/// *For any* two weekday occurrences and date, union matches when either
/// does, difference when only the first does, and complement when the
/// operand does not.
#[test]
fn property_algebra_matches_boolean_logic() {
    proptest!(|(
        date in arb_date(),
        a_ord in 0usize..5,
        a_day in arb_weekday(),
        b_ord in 0usize..5,
        b_day in arb_weekday()
    )| {
        let a = DayOfMonth::nth(Ordinal::ALL[a_ord], a_day);
        let b = DayOfMonth::nth(Ordinal::ALL[b_ord], b_day);

        prop_assert_eq!(a.union(b).matches(date), a.matches(date) || b.matches(date));
        prop_assert_eq!(a.difference(b).matches(date), a.matches(date) && !b.matches(date));
        prop_assert_eq!(a.complement().matches(date), !a.matches(date));
    });
}

/// **Feature: calendar-scheduler, Property 8: Every weekday occurrence**
#[test]
fn property_every_weekday() {
    proptest!(|(date in arb_date(), weekday in arb_weekday())| {
        prop_assert_eq!(DayOfMonth::every(weekday).matches(date), date.weekday() == weekday);
    });
}

#[test]
fn test_fourth_occurrence_can_also_be_last() {
    // February 2021 has exactly four Mondays; the 22nd is both
    let date = NaiveDate::from_ymd_opt(2021, 2, 22).unwrap();
    assert_eq!(days_in_month(date), 28);
    assert!(DayOfMonth::nth(Ordinal::Fourth, Weekday::Mon).matches(date));
    assert!(DayOfMonth::nth(Ordinal::Last, Weekday::Mon).matches(date));
}

#[test]
fn test_unknown_token_is_rejected() {
    assert!(DayOfMonth::parse("SecondBlueMoon").is_err());
    assert!(DayOfMonth::parse("23th").is_err());
    assert!(DayOfMonth::parse("23rd").is_ok());
}

/// **Feature: calendar-scheduler, Property 9: Range intersection is the overlap**
///
/// *For any* two ranges, a date lies in the intersection exactly when it lies
/// in both; disjoint ranges have no intersection.
#[test]
fn property_date_range_intersection() {
    proptest!(|(
        a in arb_date(),
        a_len in 0i64..400,
        b in arb_date(),
        b_len in 0i64..400,
        probe in arb_date()
    )| {
        let first = DateRange::new(a, Some(a + Duration::days(a_len))).unwrap();
        let second = DateRange::new(b, Some(b + Duration::days(b_len))).unwrap();
        let in_both = first.contains_date(probe) && second.contains_date(probe);

        match first.intersect(&second) {
            Some(overlap) => prop_assert_eq!(overlap.contains_date(probe), in_both),
            None => prop_assert!(!in_both),
        }
        prop_assert!(!in_both || first.union(&second).contains_date(probe));
    });
}

#[test]
fn test_date_range_intersection_examples() {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
    let inner = DateRange::new(date(2005, 2, 20), Some(date(2005, 4, 21))).unwrap();
    let outer = DateRange::new(date(1905, 1, 30), Some(date(2010, 5, 20))).unwrap();
    assert_eq!(inner.intersect(&outer), Some(inner));

    let early = DateRange::new(date(2020, 1, 1), Some(date(2020, 1, 31))).unwrap();
    let late = DateRange::new(date(2020, 2, 1), Some(date(2020, 2, 28))).unwrap();
    assert_eq!(early.intersect(&late), None);
}

/// **Feature: calendar-scheduler, Property 10: Time windows are closed intervals**
#[test]
fn property_time_range_contains() {
    proptest!(|(start in 0u32..86_400, len in 0u32..86_400, probe in 0u32..86_400)| {
        let stop = (start + len).min(86_399);
        let at = |secs: u32| NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap();
        let range = TimeRange::new(at(start), Some(at(stop))).unwrap();
        prop_assert_eq!(range.contains(at(probe)), start <= probe && probe <= stop);
    });
}
