use super::{last_elapsed, within_firing_window, RecurringSchedule, ScheduleTrigger};
use crate::errors::ScheduleError;
use crate::range::TimeRange;
use crate::settings::{ScheduleSettings, TimerSettings};
use chrono::{Duration, NaiveDateTime};

/// Fires at a fixed frequency, optionally only inside a daily time window.
///
/// | lastElapsed | frequency | due when |
/// |---|---|---|
/// | unset | > 0 | immediately |
/// | unset | 0, window set | within five minutes of the window start |
/// | unset | 0, no window | immediately, once |
/// | set | > 0 | `now >= lastElapsed + frequency` |
/// | set | 0 | `now >= lastElapsed + 1 day` |
///
/// The window and the recurring rules gate every row.
#[derive(Debug, Clone, Default)]
pub struct TimerSchedule {
    recurring: RecurringSchedule,
    frequency: Duration,
    time_range: Option<TimeRange>,
}

impl TimerSchedule {
    pub const TYPE_NAME: &'static str = "Timer";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }
}

impl ScheduleTrigger for TimerSchedule {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn configure(&mut self, settings: &ScheduleSettings) -> Result<(), ScheduleError> {
        let config = TimerSettings::try_from(settings)?;
        self.recurring.bind(config.recurring);
        self.frequency = config.frequency;
        self.time_range = config.time_range;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.recurring.is_configured()
    }

    fn has_elapsed(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        if !self.recurring.is_due_on(now) {
            return false;
        }
        if let Some(range) = self.time_range {
            if !range.contains(now.time()) {
                return false;
            }
        }

        let periodic = self.frequency > Duration::zero();
        match last_elapsed(settings) {
            None if periodic => true,
            None => self
                .time_range
                .map_or(true, |range| within_firing_window(now.time(), range.start())),
            Some(last) if periodic => now >= last + self.frequency,
            Some(last) => now >= last + Duration::days(1),
        }
    }

    fn has_expired(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool {
        self.recurring.is_past(settings, now)
    }
}
