use super::{last_elapsed, within_firing_window, RecurringSchedule, ScheduleTrigger};
use crate::errors::ScheduleError;
use crate::settings::{DailySettings, ScheduleSettings};
use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Once a day at a time of day, on days the recurring rules allow.
///
/// Due when `now` is within five minutes after `timeOfDay` and either the
/// schedule never fired or its last firing is at least a day old.
#[derive(Debug, Clone, Default)]
pub struct DailySchedule {
    recurring: RecurringSchedule,
    time_of_day: Option<NaiveTime>,
}

impl DailySchedule {
    pub const TYPE_NAME: &'static str = "Daily";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_of_day(&self) -> Option<NaiveTime> {
        self.time_of_day
    }
}

impl ScheduleTrigger for DailySchedule {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn configure(&mut self, settings: &ScheduleSettings) -> Result<(), ScheduleError> {
        let config = DailySettings::try_from(settings)?;
        self.recurring.bind(config.recurring);
        self.time_of_day = Some(config.time_of_day);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.recurring.is_configured() && self.time_of_day.is_some()
    }

    fn has_elapsed(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        let Some(time_of_day) = self.time_of_day else {
            return false;
        };
        if !self.recurring.is_due_on(now) {
            return false;
        }
        let rested = last_elapsed(settings).map_or(true, |last| now >= last + Duration::days(1));
        rested && within_firing_window(now.time(), time_of_day)
    }

    fn has_expired(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        self.recurring.is_past(settings, now)
    }
}
