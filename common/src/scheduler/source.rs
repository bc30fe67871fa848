// Where the scheduler loads its schedule definitions from

use crate::config::Settings;
use crate::errors::ScheduleError;
use crate::settings::ScheduleSettings;
use std::sync::{Arc, PoisonError, RwLock};

/// Supplies schedule definitions to the loop on first access and on refresh
#[cfg_attr(test, mockall::automock)]
pub trait ScheduleSource: Send + Sync {
    fn load(&self) -> Result<Vec<ScheduleSettings>, ScheduleError>;
}

/// The `schedules` table of the application configuration
#[derive(Debug, Clone)]
pub struct ConfigScheduleSource {
    settings: Arc<Settings>,
}

impl ConfigScheduleSource {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

impl ScheduleSource for ConfigScheduleSource {
    fn load(&self) -> Result<Vec<ScheduleSettings>, ScheduleError> {
        Ok(self.settings.schedule_settings())
    }
}

/// Definitions held in memory; `replace` swaps what the next refresh sees
#[derive(Debug, Clone, Default)]
pub struct StaticScheduleSource {
    schedules: Arc<RwLock<Vec<ScheduleSettings>>>,
}

impl StaticScheduleSource {
    pub fn new(schedules: Vec<ScheduleSettings>) -> Self {
        Self {
            schedules: Arc::new(RwLock::new(schedules)),
        }
    }

    pub fn replace(&self, schedules: Vec<ScheduleSettings>) {
        *self
            .schedules
            .write()
            .unwrap_or_else(PoisonError::into_inner) = schedules;
    }
}

impl ScheduleSource for StaticScheduleSource {
    fn load(&self) -> Result<Vec<ScheduleSettings>, ScheduleError> {
        Ok(self
            .schedules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
