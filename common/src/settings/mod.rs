// Schedule settings: the string property bag and the typed views over it

pub mod bag;
pub mod schedule;

pub use bag::SettingsBag;
pub use schedule::{keys, DailySettings, RecurringSettings, ScheduleSettings, TimerSettings};

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Settings shared between a registered schedule, its firings and its listeners
#[derive(Debug, Clone, Default)]
pub struct SharedSettings(Arc<RwLock<ScheduleSettings>>);

impl SharedSettings {
    pub fn new(settings: ScheduleSettings) -> Self {
        Self(Arc::new(RwLock::new(settings)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ScheduleSettings> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ScheduleSettings> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A detached copy of the current values
    pub fn snapshot(&self) -> ScheduleSettings {
        self.read().clone()
    }

    pub fn ptr_eq(&self, other: &SharedSettings) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ScheduleSettings> for SharedSettings {
    fn from(settings: ScheduleSettings) -> Self {
        Self::new(settings)
    }
}
