// Trigger family: decides whether a schedule is due or finished at a given instant
//
// Triggers are configured once from a settings snapshot and then queried on
// every poll. The lifecycle timestamps they depend on (lastElapsed,
// dateExpired) are read from the live settings at query time, so the loop and
// the failure governor can move them without reconfiguring the trigger.

pub mod daily;
pub mod factory;
pub mod recurring;
pub mod timer;

pub use daily::DailySchedule;
pub use factory::{ScheduleFactory, TriggerConstructor};
pub use recurring::RecurringSchedule;
pub use timer::TimerSchedule;

use crate::errors::ScheduleError;
use crate::settings::{keys, ScheduleSettings};
use chrono::{NaiveDateTime, NaiveTime};
use std::fmt;
use tracing::warn;

/// Seconds after the target time during which a once-a-day trigger still fires.
/// The poll interval does not land on exact seconds.
pub const FIRING_WINDOW_SECONDS: i64 = 5 * 60;

pub trait ScheduleTrigger: Send + Sync + fmt::Debug {
    /// Type name as registered with the factory
    fn type_name(&self) -> &'static str;

    /// Bind the trigger to `settings`. May be called again to reconfigure.
    fn configure(&mut self, settings: &ScheduleSettings) -> Result<(), ScheduleError>;

    fn is_configured(&self) -> bool;

    /// Whether the trigger condition holds at `now`. Side-effect free.
    fn has_elapsed(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool;

    /// Whether the trigger's absolute window is over at `now`
    fn has_expired(&self, settings: &ScheduleSettings, now: NaiveDateTime) -> bool;
}

/// `lastElapsed` from live settings; malformed values are logged and read as unset
pub(crate) fn last_elapsed(settings: &ScheduleSettings) -> Option<NaiveDateTime> {
    settings.last_elapsed().unwrap_or_else(|err| {
        warn!(error = %err, key = keys::LAST_ELAPSED, "Ignoring malformed lifecycle timestamp");
        None
    })
}

pub(crate) fn date_expired(settings: &ScheduleSettings) -> Option<NaiveDateTime> {
    settings.date_expired().unwrap_or_else(|err| {
        warn!(error = %err, key = keys::DATE_EXPIRED, "Ignoring malformed lifecycle timestamp");
        None
    })
}

/// True when `now` is within [`FIRING_WINDOW_SECONDS`] after `target`, across midnight
pub(crate) fn within_firing_window(now: NaiveTime, target: NaiveTime) -> bool {
    crate::format::seconds_past(now, target) <= FIRING_WINDOW_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_firing_window_bounds() {
        assert!(within_firing_window(t(9, 0, 0), t(9, 0, 0)));
        assert!(within_firing_window(t(9, 5, 0), t(9, 0, 0)));
        assert!(!within_firing_window(t(9, 5, 1), t(9, 0, 0)));
        assert!(!within_firing_window(t(8, 59, 59), t(9, 0, 0)));
        assert!(within_firing_window(t(0, 3, 0), t(23, 58, 0)));
    }

    #[test]
    fn test_malformed_timestamps_read_as_unset() {
        let settings = ScheduleSettings::new("a", "Timer")
            .with("lastElapsed", "garbage")
            .with("dateExpired", "also garbage");
        assert_eq!(last_elapsed(&settings), None);
        assert_eq!(date_expired(&settings), None);
    }
}
