// Registered schedules: a trigger bound to its live settings plus per-schedule listeners

use super::listener::{ListenerSet, ScheduleListener, SubscriptionId};
use crate::errors::ScheduleError;
use crate::settings::{ScheduleSettings, SharedSettings};
use crate::trigger::{ScheduleFactory, ScheduleTrigger};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// One registered schedule.
///
/// Lock order is trigger before settings.
pub struct Schedule {
    name: String,
    trigger: RwLock<Box<dyn ScheduleTrigger>>,
    settings: SharedSettings,
    elapsed_listeners: ListenerSet,
    expired_listeners: ListenerSet,
}

impl Schedule {
    /// Build the trigger named by the `type` setting
    pub fn from_settings(
        settings: ScheduleSettings,
        factory: &ScheduleFactory,
    ) -> Result<Self, ScheduleError> {
        let trigger = factory.build(&settings)?;
        Self::assemble(trigger, settings)
    }

    /// Use a caller-supplied trigger; it is configured from `settings` here
    pub fn with_trigger(
        mut trigger: Box<dyn ScheduleTrigger>,
        settings: ScheduleSettings,
    ) -> Result<Self, ScheduleError> {
        trigger.configure(&settings)?;
        Self::assemble(trigger, settings)
    }

    fn assemble(
        trigger: Box<dyn ScheduleTrigger>,
        settings: ScheduleSettings,
    ) -> Result<Self, ScheduleError> {
        let name = settings
            .name()
            .map_err(|_| ScheduleError::MissingField("name".to_string()))?
            .to_string();
        Ok(Self {
            name,
            trigger: RwLock::new(trigger),
            settings: SharedSettings::new(settings),
            elapsed_listeners: ListenerSet::new(),
            expired_listeners: ListenerSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.trigger
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .type_name()
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// A malformed `enabled` value is logged and treated as disabled.
    ///
    /// A schedule disabled after a fatal failure stays disabled whatever
    /// `enabled` says.
    pub fn is_enabled(&self) -> bool {
        let settings = self.settings.read();
        if !matches!(settings.disabled_at(), Ok(None)) {
            return false;
        }
        settings.enabled().unwrap_or_else(|err| {
            warn!(schedule = %self.name, error = %err, "Unreadable enabled flag, skipping");
            false
        })
    }

    pub fn has_elapsed(&self, now: NaiveDateTime) -> bool {
        let trigger = self.trigger.read().unwrap_or_else(PoisonError::into_inner);
        let settings = self.settings.read();
        trigger.has_elapsed(&settings, now)
    }

    pub fn has_expired(&self, now: NaiveDateTime) -> bool {
        let trigger = self.trigger.read().unwrap_or_else(PoisonError::into_inner);
        let settings = self.settings.read();
        trigger.has_expired(&settings, now)
    }

    pub fn mark_elapsed(&self, now: NaiveDateTime) {
        let mut settings = self.settings.write();
        settings.set_last_elapsed(Some(now));
        settings.set_date_updated(now);
    }

    pub fn mark_expired(&self, now: NaiveDateTime) {
        let mut settings = self.settings.write();
        settings.set_date_expired(Some(now));
        settings.set_date_updated(now);
    }

    /// Stamp `initializeDate` unless the settings already carry one
    pub fn mark_initialized(&self, now: NaiveDateTime) {
        let mut settings = self.settings.write();
        if !matches!(settings.initialize_date(), Ok(Some(_))) {
            settings.set_initialize_date(now);
        }
    }

    /// Replace the configured values in place, keeping listeners and lifecycle state.
    ///
    /// A changed `type` swaps in a new trigger from `factory`. On error the
    /// schedule is left as it was.
    pub fn reconfigure(
        &self,
        mut settings: ScheduleSettings,
        factory: &ScheduleFactory,
    ) -> Result<(), ScheduleError> {
        let type_name = settings
            .schedule_type()
            .map_err(|_| ScheduleError::MissingField("type".to_string()))?;
        let mut candidate = factory.create(type_name)?;

        let mut trigger = self.trigger.write().unwrap_or_else(PoisonError::into_inner);
        let mut live = self.settings.write();
        settings.inherit_lifecycle(&live);
        if candidate.type_name() == trigger.type_name() {
            trigger.configure(&settings)?;
        } else {
            candidate.configure(&settings)?;
            *trigger = candidate;
        }
        *live = settings;
        Ok(())
    }

    pub fn on_elapsed(&self, listener: Arc<dyn ScheduleListener>) -> SubscriptionId {
        self.elapsed_listeners.subscribe(listener)
    }

    pub fn on_expired(&self, listener: Arc<dyn ScheduleListener>) -> SubscriptionId {
        self.expired_listeners.subscribe(listener)
    }

    /// Remove a per-schedule subscription of either kind
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.elapsed_listeners.unsubscribe(id) || self.expired_listeners.unsubscribe(id)
    }

    pub(crate) fn elapsed_listeners(&self) -> &ListenerSet {
        &self.elapsed_listeners
    }

    pub(crate) fn expired_listeners(&self) -> &ListenerSet {
        &self.expired_listeners
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("settings", &self.settings.snapshot())
            .field("elapsed_listeners", &self.elapsed_listeners.len())
            .field("expired_listeners", &self.expired_listeners.len())
            .finish()
    }
}

/// Name-keyed store of schedules; names compare case-insensitively
#[derive(Debug, Default, Clone)]
pub struct ScheduleCollection {
    entries: BTreeMap<String, Arc<Schedule>>,
}

impl ScheduleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, schedule: Arc<Schedule>) -> Result<(), ScheduleError> {
        let key = schedule.name().to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(ScheduleError::DuplicateSchedule(schedule.name().to_string()));
        }
        self.entries.insert(key, schedule);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Schedule>> {
        self.entries.remove(&name.to_lowercase())
    }

    /// Remove `name` only if it is still this exact schedule
    pub fn remove_entry(&mut self, schedule: &Arc<Schedule>) -> bool {
        let key = schedule.name().to_lowercase();
        match self.entries.get(&key) {
            Some(current) if Arc::ptr_eq(current, schedule) => {
                self.entries.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schedule>> {
        self.entries.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|schedule| schedule.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schedule>> {
        self.entries.values()
    }

    /// Schedules in name order
    pub fn snapshot(&self) -> Vec<Arc<Schedule>> {
        self.entries.values().cloned().collect()
    }
}
