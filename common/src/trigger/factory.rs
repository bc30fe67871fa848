// Registration table from trigger type names to constructors

use super::{DailySchedule, RecurringSchedule, ScheduleTrigger, TimerSchedule};
use crate::errors::ScheduleError;
use crate::settings::ScheduleSettings;
use std::collections::HashMap;

pub type TriggerConstructor = fn() -> Box<dyn ScheduleTrigger>;

/// Resolves the `type` setting to a trigger. Names compare case-insensitively.
#[derive(Clone)]
pub struct ScheduleFactory {
    constructors: HashMap<String, TriggerConstructor>,
}

impl ScheduleFactory {
    /// A factory with no types registered
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: &str, constructor: TriggerConstructor) {
        self.constructors
            .insert(type_name.to_lowercase(), constructor);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.constructors.contains_key(&type_name.to_lowercase())
    }

    /// An unconfigured trigger of the named type
    pub fn create(&self, type_name: &str) -> Result<Box<dyn ScheduleTrigger>, ScheduleError> {
        self.constructors
            .get(&type_name.trim().to_lowercase())
            .map(|constructor| constructor())
            .ok_or_else(|| ScheduleError::CannotCreate {
                type_name: type_name.to_string(),
            })
    }

    /// Create the trigger named by `settings.type` and configure it
    pub fn build(
        &self,
        settings: &ScheduleSettings,
    ) -> Result<Box<dyn ScheduleTrigger>, ScheduleError> {
        let type_name = settings
            .schedule_type()
            .map_err(|_| ScheduleError::MissingField("type".to_string()))?;
        let mut trigger = self.create(type_name)?;
        trigger.configure(settings)?;
        Ok(trigger)
    }
}

impl Default for ScheduleFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("Recurring", new_recurring);
        factory.register("RecurringSchedule", new_recurring);
        factory.register("Daily", new_daily);
        factory.register("DailySchedule", new_daily);
        factory.register("Timer", new_timer);
        factory.register("TimerSchedule", new_timer);
        factory
    }
}

fn new_recurring() -> Box<dyn ScheduleTrigger> {
    Box::new(RecurringSchedule::new())
}

fn new_daily() -> Box<dyn ScheduleTrigger> {
    Box::new(DailySchedule::new())
}

fn new_timer() -> Box<dyn ScheduleTrigger> {
    Box::new(TimerSchedule::new())
}

impl std::fmt::Debug for ScheduleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ScheduleFactory")
            .field("types", &names)
            .finish()
    }
}
