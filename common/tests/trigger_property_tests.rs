// Property-based tests for schedule triggers
// Feature: calendar-scheduler

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use common::settings::ScheduleSettings;
use common::trigger::{DailySchedule, ScheduleFactory, ScheduleTrigger, TimerSchedule};
use proptest::prelude::*;

fn arb_datetime() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..3_650, 0u32..86_400).prop_map(|(day, secs)| {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(day);
        date.and_time(NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap())
    })
}

fn configured<T: ScheduleTrigger + Default>(settings: &ScheduleSettings) -> T {
    let mut trigger = T::default();
    trigger.configure(settings).unwrap();
    trigger
}

/// **Feature: calendar-scheduler, Property 11: Periodic timers fire immediately**
///
/// *For any* time, a timer with a nonzero frequency and no prior firing is due.
#[test]
fn property_timer_fires_immediately_without_history() {
    let settings = ScheduleSettings::new("hourly", "Timer").with("frequency", "01:00:00");
    let trigger: TimerSchedule = configured(&settings);
    proptest!(|(now in arb_datetime())| {
        prop_assert!(trigger.has_elapsed(&settings, now), "should be due at {}", now);
    });
}

/// **Feature: calendar-scheduler, Property 12: Periodic timers wait one period**
///
/// *For any* last firing and offset, the timer is due again exactly when the
/// frequency has passed.
#[test]
fn property_timer_waits_for_frequency() {
    proptest!(|(last in arb_datetime(), offset_secs in 0i64..7_200)| {
        let mut settings = ScheduleSettings::new("hourly", "Timer").with("frequency", "01:00:00");
        settings.set_last_elapsed(Some(last));
        let trigger: TimerSchedule = configured(&settings);

        let now = last + Duration::seconds(offset_secs);
        prop_assert_eq!(trigger.has_elapsed(&settings, now), offset_secs >= 3_600);
    });
}

/// **Feature: calendar-scheduler, Property 13: Daily firing window**
///
/// *For any* time with no prior firing, a 9 AM daily trigger is due only
/// between 09:00:00 and 09:05:00 inclusive.
#[test]
fn property_daily_window_without_history() {
    let settings = ScheduleSettings::new("report", "Daily").with("timeOfDay", "09:00:00 AM");
    let trigger: DailySchedule = configured(&settings);
    let open = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(9, 5, 0).unwrap();

    proptest!(|(now in arb_datetime())| {
        let expected = open <= now.time() && now.time() <= close;
        prop_assert_eq!(trigger.has_elapsed(&settings, now), expected, "at {}", now);
    });
}

/// **Feature: calendar-scheduler, Property 14: Daily triggers rest for a day**
///
/// *For any* last firing, a daily trigger inside its window is due only once
/// a full day has passed.
#[test]
fn property_daily_rests_a_full_day() {
    proptest!(|(days_ago in 0i64..5, window_secs in 0i64..=300, last_secs in 0i64..=300)| {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let now = today.and_time(nine) + Duration::seconds(window_secs);
        let last = (today - Duration::days(days_ago)).and_time(nine) + Duration::seconds(last_secs);

        let mut settings =
            ScheduleSettings::new("report", "Daily").with("timeOfDay", "09:00:00 AM");
        settings.set_last_elapsed(Some(last));
        let trigger: DailySchedule = configured(&settings);

        prop_assert_eq!(
            trigger.has_elapsed(&settings, now),
            now >= last + Duration::days(1)
        );
    });
}

/// **Feature: calendar-scheduler, Property 15: Evaluation has no side effects**
///
/// *For any* time, asking twice gives the same answer and leaves the settings untouched.
#[test]
fn property_evaluation_is_pure() {
    let factory = ScheduleFactory::default();
    proptest!(|(now in arb_datetime())| {
        let settings = ScheduleSettings::new("window", "Timer")
            .with("timeRange", "08:00:00 AM - 05:00:00 PM")
            .with("dayOfMonth", "AllWeekdays")
            .with("dateRange", "01/01/2021 - 12/31/2027");
        let trigger = factory.build(&settings).unwrap();
        let before = settings.clone();

        let first = (trigger.has_elapsed(&settings, now), trigger.has_expired(&settings, now));
        let second = (trigger.has_elapsed(&settings, now), trigger.has_expired(&settings, now));
        prop_assert_eq!(first, second);
        prop_assert_eq!(settings, before);
    });
}

#[test]
fn test_zero_frequency_timer_waits_a_day_after_firing() {
    let mut settings = ScheduleSettings::new("once", "Timer");
    let trigger: TimerSchedule = configured(&settings);
    let now = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(15, 30, 0)
        .unwrap();

    assert!(trigger.has_elapsed(&settings, now));
    settings.set_last_elapsed(Some(now));
    assert!(!trigger.has_elapsed(&settings, now + Duration::hours(1)));
}

#[test]
fn test_expired_once_date_range_ends() {
    let settings = ScheduleSettings::new("campaign", "Daily")
        .with("timeOfDay", "09:00:00 AM")
        .with("dateRange", "03/01/2024 - 03/31/2024");
    let trigger: DailySchedule = configured(&settings);
    let at = |m, d| {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(9, 1, 0)
            .unwrap()
    };

    assert!(trigger.has_elapsed(&settings, at(3, 31)));
    assert!(!trigger.has_expired(&settings, at(3, 31)));
    assert!(!trigger.has_elapsed(&settings, at(4, 1)));
    assert!(trigger.has_expired(&settings, at(4, 1)));
}
