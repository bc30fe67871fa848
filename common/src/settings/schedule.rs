// Typed view of a schedule's settings and the per-type validated views built from it

use super::bag::SettingsBag;
use crate::calendar::DayOfMonth;
use crate::errors::{ScheduleError, SettingsError};
use crate::format::{parse_duration, parse_time};
use crate::range::{DateRange, TimeRange};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known settings keys
pub mod keys {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const SUB_TYPE: &str = "subType";
    pub const ID: &str = "id";
    pub const ENABLED: &str = "enabled";
    pub const IDENTITY: &str = "identity";
    pub const PASSWORD: &str = "password";
    pub const DAY_OF_MONTH: &str = "dayOfMonth";
    pub const DAYS_OF_MONTH: &str = "daysOfMonth";
    pub const DATE_RANGE: &str = "dateRange";
    pub const TIME_OF_DAY: &str = "timeOfDay";
    pub const TIME_RANGE: &str = "timeRange";
    pub const FREQUENCY: &str = "frequency";
    pub const LAST_ELAPSED: &str = "lastElapsed";
    pub const DATE_EXPIRED: &str = "dateExpired";
    pub const DATE_UPDATED: &str = "dateUpdated";
    pub const INITIALIZE_DATE: &str = "initializeDate";
    pub const CONSECUTIVE_FAILURES: &str = "consecutiveFailures";
    pub const GOVERNED: &str = "governed";
    pub const DISABLED_AT: &str = "disabledAt";

    /// Keys written by the scheduler at runtime rather than by configuration
    pub const LIFECYCLE: &[&str] = &[
        LAST_ELAPSED,
        DATE_EXPIRED,
        DATE_UPDATED,
        INITIALIZE_DATE,
        CONSECUTIVE_FAILURES,
        DISABLED_AT,
    ];
}

/// The settings of one schedule.
///
/// `name` and `type` are required before a trigger can be built. Lifecycle
/// timestamps are zero-sentineled on the wire and surface here as `Option`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSettings {
    bag: SettingsBag,
}

impl ScheduleSettings {
    pub fn new(name: &str, schedule_type: &str) -> Self {
        let mut settings = Self::default();
        settings.bag.set(keys::NAME, name);
        settings.bag.set(keys::TYPE, schedule_type);
        settings
    }

    /// Builder-style setter for raw values
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.bag.set(key, value);
        self
    }

    pub fn bag(&self) -> &SettingsBag {
        &self.bag
    }

    pub fn bag_mut(&mut self) -> &mut SettingsBag {
        &mut self.bag
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.bag.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.bag.set(key, value);
    }

    pub fn name(&self) -> Result<&str, SettingsError> {
        self.bag.get_required(keys::NAME)
    }

    pub fn schedule_type(&self) -> Result<&str, SettingsError> {
        self.bag.get_required(keys::TYPE)
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.bag.get(keys::SUB_TYPE)
    }

    pub fn id(&self) -> Result<Option<i64>, SettingsError> {
        self.bag.get_parsed(keys::ID)
    }

    /// Absent means enabled
    pub fn enabled(&self) -> Result<bool, SettingsError> {
        Ok(self.bag.get_bool(keys::ENABLED)?.unwrap_or(true))
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.bag.set_bool(keys::ENABLED, enabled);
    }

    /// Absent means the job listener is wrapped in the failure governor
    pub fn governed(&self) -> Result<bool, SettingsError> {
        Ok(self.bag.get_bool(keys::GOVERNED)?.unwrap_or(true))
    }

    pub fn identity(&self) -> Option<&str> {
        self.bag.get(keys::IDENTITY)
    }

    pub fn password(&self) -> Option<&str> {
        self.bag.get(keys::PASSWORD)
    }

    /// Reads `dayOfMonth`, falling back to `daysOfMonth`
    pub fn day_of_month(&self) -> Result<Option<DayOfMonth>, ScheduleError> {
        self.bag
            .get(keys::DAY_OF_MONTH)
            .or_else(|| self.bag.get(keys::DAYS_OF_MONTH))
            .map(DayOfMonth::parse)
            .transpose()
    }

    pub fn date_range(&self) -> Result<Option<DateRange>, ScheduleError> {
        self.bag
            .get(keys::DATE_RANGE)
            .map(str::parse)
            .transpose()
    }

    pub fn time_of_day(&self) -> Result<Option<NaiveTime>, ScheduleError> {
        self.bag
            .get(keys::TIME_OF_DAY)
            .map(|raw| parse_time(raw).ok_or_else(|| ScheduleError::InvalidTimeOfDay(raw.to_string())))
            .transpose()
    }

    pub fn time_range(&self) -> Result<Option<TimeRange>, ScheduleError> {
        self.bag
            .get(keys::TIME_RANGE)
            .map(str::parse)
            .transpose()
    }

    pub fn frequency(&self) -> Result<Option<Duration>, ScheduleError> {
        self.bag
            .get(keys::FREQUENCY)
            .map(|raw| {
                parse_duration(raw).ok_or_else(|| ScheduleError::InvalidFrequency(raw.to_string()))
            })
            .transpose()
    }

    pub fn last_elapsed(&self) -> Result<Option<NaiveDateTime>, SettingsError> {
        self.bag.get_datetime(keys::LAST_ELAPSED)
    }

    pub fn set_last_elapsed(&mut self, at: Option<NaiveDateTime>) {
        self.bag.set_datetime(keys::LAST_ELAPSED, at);
    }

    pub fn date_expired(&self) -> Result<Option<NaiveDateTime>, SettingsError> {
        self.bag.get_datetime(keys::DATE_EXPIRED)
    }

    pub fn set_date_expired(&mut self, at: Option<NaiveDateTime>) {
        self.bag.set_datetime(keys::DATE_EXPIRED, at);
    }

    pub fn date_updated(&self) -> Result<Option<NaiveDateTime>, SettingsError> {
        self.bag.get_datetime(keys::DATE_UPDATED)
    }

    pub fn set_date_updated(&mut self, at: NaiveDateTime) {
        self.bag.set_datetime(keys::DATE_UPDATED, Some(at));
    }

    pub fn initialize_date(&self) -> Result<Option<NaiveDateTime>, SettingsError> {
        self.bag.get_datetime(keys::INITIALIZE_DATE)
    }

    pub fn set_initialize_date(&mut self, at: NaiveDateTime) {
        self.bag.set_datetime(keys::INITIALIZE_DATE, Some(at));
    }

    /// Set when the loop disables the schedule after a fatal failure
    pub fn disabled_at(&self) -> Result<Option<NaiveDateTime>, SettingsError> {
        self.bag.get_datetime(keys::DISABLED_AT)
    }

    pub fn set_disabled_at(&mut self, at: NaiveDateTime) {
        self.bag.set_datetime(keys::DISABLED_AT, Some(at));
    }

    /// `None` until the first failure is recorded
    pub fn consecutive_failures(&self) -> Result<Option<u32>, SettingsError> {
        self.bag.get_parsed(keys::CONSECUTIVE_FAILURES)
    }

    pub fn set_consecutive_failures(&mut self, count: u32) {
        self.bag.set_value(keys::CONSECUTIVE_FAILURES, &count);
    }

    pub fn clear_consecutive_failures(&mut self) -> bool {
        self.bag.remove(keys::CONSECUTIVE_FAILURES).is_some()
    }

    /// Copy runtime-written keys from `previous` that this value does not set itself
    pub fn inherit_lifecycle(&mut self, previous: &ScheduleSettings) {
        for key in keys::LIFECYCLE {
            if self.bag.get(key).is_none() {
                if let Some(value) = previous.bag.get(key) {
                    self.bag.set(key, value);
                }
            }
        }
    }
}

impl From<SettingsBag> for ScheduleSettings {
    fn from(bag: SettingsBag) -> Self {
        Self { bag }
    }
}

impl From<HashMap<String, String>> for ScheduleSettings {
    fn from(map: HashMap<String, String>) -> Self {
        Self { bag: map.into() }
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ScheduleSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            bag: iter.into_iter().collect(),
        }
    }
}

/// Fields shared by every trigger type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringSettings {
    pub name: String,
    pub enabled: bool,
    pub sub_type: Option<String>,
    pub id: Option<i64>,
    pub day_of_month: Option<DayOfMonth>,
    pub date_range: Option<DateRange>,
}

impl TryFrom<&ScheduleSettings> for RecurringSettings {
    type Error = ScheduleError;

    fn try_from(settings: &ScheduleSettings) -> Result<Self, Self::Error> {
        let name = settings
            .name()
            .map_err(|_| ScheduleError::MissingField(keys::NAME.to_string()))?;
        settings
            .schedule_type()
            .map_err(|_| ScheduleError::MissingField(keys::TYPE.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            enabled: settings.enabled()?,
            sub_type: settings.sub_type().map(str::to_string),
            id: settings.id()?,
            day_of_month: settings.day_of_month()?,
            date_range: settings.date_range()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySettings {
    pub recurring: RecurringSettings,
    pub time_of_day: NaiveTime,
}

impl TryFrom<&ScheduleSettings> for DailySettings {
    type Error = ScheduleError;

    fn try_from(settings: &ScheduleSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            recurring: RecurringSettings::try_from(settings)?,
            time_of_day: settings
                .time_of_day()?
                .ok_or_else(|| ScheduleError::MissingField(keys::TIME_OF_DAY.to_string()))?,
        })
    }
}

/// A missing frequency reads as zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    pub recurring: RecurringSettings,
    pub frequency: Duration,
    pub time_range: Option<TimeRange>,
}

impl TryFrom<&ScheduleSettings> for TimerSettings {
    type Error = ScheduleError;

    fn try_from(settings: &ScheduleSettings) -> Result<Self, Self::Error> {
        let frequency = settings.frequency()?.unwrap_or_else(Duration::zero);
        if frequency < Duration::zero() {
            return Err(ScheduleError::InvalidFrequency(
                settings.get(keys::FREQUENCY).unwrap_or_default().to_string(),
            ));
        }
        Ok(Self {
            recurring: RecurringSettings::try_from(settings)?,
            frequency,
            time_range: settings.time_range()?,
        })
    }
}
