// Job table: maps a schedule's `subType` to the listener that does the work

use crate::errors::{JobError, ScheduleError};
use crate::scheduler::launcher::ScheduleLauncher;
use crate::scheduler::listener::{ScheduleEvent, ScheduleListener};
use crate::settings::ScheduleSettings;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub type JobConstructor =
    Arc<dyn Fn(&ScheduleSettings) -> Result<Arc<dyn ScheduleListener>, ScheduleError> + Send + Sync>;

/// Registered job kinds, resolved case-insensitively by `subType`
#[derive(Clone, Default)]
pub struct JobRegistry {
    constructors: HashMap<String, JobConstructor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `log` job
    pub fn with_builtin_jobs() -> Self {
        let mut registry = Self::new();
        registry.register(LogJob::SUB_TYPE, |_| {
            Ok(Arc::new(LogJob) as Arc<dyn ScheduleListener>)
        });
        registry
    }

    pub fn register<F>(&mut self, sub_type: &str, constructor: F)
    where
        F: Fn(&ScheduleSettings) -> Result<Arc<dyn ScheduleListener>, ScheduleError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(sub_type.to_lowercase(), Arc::new(constructor));
    }

    pub fn contains(&self, sub_type: &str) -> bool {
        self.constructors.contains_key(&sub_type.to_lowercase())
    }

    /// Listener for the schedule's `subType`, wrapped in the failure governor
    /// unless the schedule sets `governed = False`.
    ///
    /// `Ok(None)` when the schedule names no job.
    pub fn build_listener(
        &self,
        settings: &ScheduleSettings,
        max_failures: u32,
    ) -> Result<Option<Arc<dyn ScheduleListener>>, ScheduleError> {
        let Some(sub_type) = settings.sub_type() else {
            return Ok(None);
        };
        let constructor = self
            .constructors
            .get(&sub_type.to_lowercase())
            .ok_or_else(|| ScheduleError::CannotCreate {
                type_name: sub_type.to_string(),
            })?;
        let job = constructor(settings)?;

        if settings.governed()? {
            Ok(Some(Arc::new(ScheduleLauncher::with_max_failures(
                job,
                max_failures,
            ))))
        } else {
            Ok(Some(job))
        }
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("JobRegistry").field("jobs", &names).finish()
    }
}

/// Records each firing in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogJob;

impl LogJob {
    pub const SUB_TYPE: &'static str = "log";
}

#[async_trait]
impl ScheduleListener for LogJob {
    async fn notify(&self, event: &ScheduleEvent) -> Result<(), JobError> {
        info!(
            schedule = %event.schedule,
            kind = %event.kind,
            firing_id = %event.firing_id,
            fired_at = %event.fired_at,
            "Schedule fired"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::listener::{listener_fn, EventKind};
    use crate::settings::SharedSettings;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn event(settings: &ScheduleSettings) -> ScheduleEvent {
        ScheduleEvent {
            schedule: settings.name().unwrap().to_string(),
            kind: EventKind::Elapsed,
            settings: SharedSettings::new(settings.clone()),
            fired_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            firing_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_no_sub_type_means_no_job() {
        let registry = JobRegistry::with_builtin_jobs();
        let settings = ScheduleSettings::new("a", "Recurring");
        assert!(registry.build_listener(&settings, 5).unwrap().is_none());
    }

    #[test]
    fn test_unknown_sub_type_cannot_be_created() {
        let registry = JobRegistry::with_builtin_jobs();
        let settings = ScheduleSettings::new("a", "Recurring").with("subType", "backup");
        assert!(matches!(
            registry.build_listener(&settings, 5),
            Err(ScheduleError::CannotCreate { .. })
        ));
    }

    #[tokio::test]
    async fn test_builtin_log_job_succeeds() {
        let registry = JobRegistry::with_builtin_jobs();
        assert!(registry.contains("LOG"));
        let settings = ScheduleSettings::new("a", "Recurring").with("subType", "Log");
        let listener = registry.build_listener(&settings, 5).unwrap().unwrap();
        assert_eq!(listener.notify(&event(&settings)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_governed_by_default_and_bare_on_request() {
        let mut registry = JobRegistry::new();
        registry.register("broken", |_| Ok(listener_fn(|_| Err(JobError::failed("nope")))));

        let governed = ScheduleSettings::new("a", "Recurring").with("subType", "broken");
        let listener = registry.build_listener(&governed, 5).unwrap().unwrap();
        // The governor swallows the first failure
        assert_eq!(listener.notify(&event(&governed)).await, Ok(()));

        let bare = governed.clone().with("governed", "False");
        let listener = registry.build_listener(&bare, 5).unwrap().unwrap();
        assert_eq!(
            listener.notify(&event(&bare)).await,
            Err(JobError::Failed("nope".to_string()))
        );
    }
}
