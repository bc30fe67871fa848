use super::{date_expired, ScheduleTrigger};
use crate::errors::ScheduleError;
use crate::settings::{RecurringSettings, ScheduleSettings};
use chrono::NaiveDateTime;

/// Fires on every poll of a matching day.
///
/// Elapsed whenever `now` lies inside the optional date range and today
/// matches the optional calendar expression. Expired once `dateExpired` has
/// been stamped or a bounded date range has ended.
#[derive(Debug, Clone, Default)]
pub struct RecurringSchedule {
    config: Option<RecurringSettings>,
}

impl RecurringSchedule {
    pub const TYPE_NAME: &'static str = "Recurring";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&RecurringSettings> {
        self.config.as_ref()
    }

    pub(crate) fn bind(&mut self, config: RecurringSettings) {
        self.config = Some(config);
    }

    /// The calendar half of the elapsed test, shared with the derived triggers
    pub(crate) fn is_due_on(&self, now: NaiveDateTime) -> bool {
        let Some(config) = &self.config else {
            return false;
        };
        let in_range = config.date_range.map_or(true, |range| range.contains(now));
        let on_calendar = config
            .day_of_month
            .map_or(true, |days| days.matches(now.date()));
        in_range && on_calendar
    }

    pub(crate) fn is_past(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        let Some(config) = &self.config else {
            return false;
        };
        date_expired(settings).is_some()
            || config.date_range.is_some_and(|range| range.has_ended(now))
    }
}

impl ScheduleTrigger for RecurringSchedule {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn configure(&mut self, settings: &ScheduleSettings) -> Result<(), ScheduleError> {
        self.bind(RecurringSettings::try_from(settings)?);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn has_elapsed(&self, _settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        self.is_due_on(now)
    }

    fn has_expired(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        self.is_past(settings, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn configured(settings: &ScheduleSettings) -> RecurringSchedule {
        let mut trigger = RecurringSchedule::new();
        trigger.configure(settings).unwrap();
        trigger
    }

    #[test]
    fn test_unconfigured_never_fires() {
        let trigger = RecurringSchedule::new();
        let settings = ScheduleSettings::new("a", "Recurring");
        assert!(!trigger.is_configured());
        assert!(!trigger.has_elapsed(&settings, at(2024, 1, 1, 0)));
        assert!(!trigger.has_expired(&settings, at(2024, 1, 1, 0)));
    }

    #[test]
    fn test_bare_recurring_always_elapsed() {
        let settings = ScheduleSettings::new("a", "Recurring");
        let trigger = configured(&settings);
        assert!(trigger.has_elapsed(&settings, at(1999, 12, 31, 23)));
        assert!(trigger.has_elapsed(&settings, at(2024, 2, 29, 0)));
        assert!(!trigger.has_expired(&settings, at(2024, 2, 29, 0)));
    }

    #[test]
    fn test_calendar_limits_days() {
        let settings = ScheduleSettings::new("a", "Recurring").with("dayOfMonth", "FirstMonday");
        let trigger = configured(&settings);
        // 2024-03-04 is the first Monday of March
        assert!(trigger.has_elapsed(&settings, at(2024, 3, 4, 12)));
        assert!(!trigger.has_elapsed(&settings, at(2024, 3, 11, 12)));
        assert!(!trigger.has_elapsed(&settings, at(2024, 3, 5, 12)));
    }

    #[test]
    fn test_date_range_bounds_elapsed_and_expiry() {
        let settings =
            ScheduleSettings::new("a", "Recurring").with("dateRange", "03/01/2024 - 03/31/2024");
        let trigger = configured(&settings);
        assert!(!trigger.has_elapsed(&settings, at(2024, 2, 29, 12)));
        assert!(trigger.has_elapsed(&settings, at(2024, 3, 31, 23)));
        assert!(!trigger.has_expired(&settings, at(2024, 3, 31, 23)));
        assert!(!trigger.has_elapsed(&settings, at(2024, 4, 1, 0)));
        assert!(trigger.has_expired(&settings, at(2024, 4, 1, 0)));
    }

    #[test]
    fn test_stamped_expiry_is_sticky() {
        let mut settings = ScheduleSettings::new("a", "Recurring");
        let trigger = configured(&settings);
        settings.set_date_expired(Some(at(2024, 1, 1, 0)));
        assert!(trigger.has_expired(&settings, at(2023, 1, 1, 0)));

        settings.set_date_expired(None);
        assert!(!trigger.has_expired(&settings, at(2023, 1, 1, 0)));
    }

    #[test]
    fn test_configure_rejects_bad_settings() {
        let mut trigger = RecurringSchedule::new();
        let settings = ScheduleSettings::new("a", "Recurring").with("dateRange", "tomorrow");
        assert!(matches!(
            trigger.configure(&settings),
            Err(ScheduleError::InvalidDateRange(_))
        ));
        assert!(!trigger.is_configured());
    }
}
