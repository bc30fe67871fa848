// Failure governor: counts consecutive listener failures and turns the last one fatal
//
// The counter lives in the schedule's settings under `consecutiveFailures`, so
// it survives reconfiguration and is visible to anything reading the settings.

use super::listener::{ScheduleEvent, ScheduleListener};
use crate::errors::JobError;
use crate::telemetry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

/// Failures tolerated before a schedule is declared fatal
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Wraps a job listener with the consecutive-failure policy.
///
/// - success clears the counter
/// - [`JobError::Cancelled`] is swallowed and not counted
/// - a failure below the cap bumps the counter, clears `lastElapsed` so the
///   schedule is due again, and is swallowed
/// - the failure after the cap removes the counter and returns
///   [`JobError::Fatal`]
pub struct ScheduleLauncher {
    inner: Arc<dyn ScheduleListener>,
    max_failures: u32,
}

impl ScheduleLauncher {
    pub fn new(inner: Arc<dyn ScheduleListener>) -> Self {
        Self::with_max_failures(inner, DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }

    pub fn with_max_failures(inner: Arc<dyn ScheduleListener>, max_failures: u32) -> Self {
        Self {
            inner,
            max_failures,
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    fn record_failure(&self, event: &ScheduleEvent, err: JobError) -> Result<(), JobError> {
        let mut settings = event.settings.write();
        let previous = settings.consecutive_failures().unwrap_or_else(|bad| {
            warn!(schedule = %event.schedule, error = %bad, "Resetting unreadable failure counter");
            None
        });
        let failures = previous.unwrap_or(0) + 1;

        telemetry::record_failure(&event.schedule);

        if failures <= self.max_failures {
            settings.set_consecutive_failures(failures);
            settings.set_last_elapsed(None);
            settings.set_date_updated(event.fired_at);
            warn!(
                schedule = %event.schedule,
                firing_id = %event.firing_id,
                failures,
                max_failures = self.max_failures,
                error = %err,
                "Job failed, schedule will retry"
            );
            return Ok(());
        }

        settings.clear_consecutive_failures();
        error!(
            schedule = %event.schedule,
            firing_id = %event.firing_id,
            failures,
            error = %err,
            "Job exceeded consecutive failure limit"
        );
        Err(JobError::Fatal {
            name: event.schedule.clone(),
            failures,
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl ScheduleListener for ScheduleLauncher {
    async fn notify(&self, event: &ScheduleEvent) -> Result<(), JobError> {
        match self.inner.notify(event).await {
            Ok(()) => {
                event.settings.write().clear_consecutive_failures();
                Ok(())
            }
            Err(JobError::Cancelled) => Ok(()),
            Err(fatal @ JobError::Fatal { .. }) => {
                event.settings.write().clear_consecutive_failures();
                Err(fatal)
            }
            Err(err) => self.record_failure(event, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::listener::{listener_fn, EventKind};
    use crate::settings::{ScheduleSettings, SharedSettings};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn event(settings: &SharedSettings) -> ScheduleEvent {
        ScheduleEvent {
            schedule: "flaky".to_string(),
            kind: EventKind::Elapsed,
            settings: settings.clone(),
            fired_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            firing_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_five_failures_then_fatal() {
        let settings = SharedSettings::new(ScheduleSettings::new("flaky", "Timer"));
        let launcher = ScheduleLauncher::new(listener_fn(|_| Err(JobError::failed("boom"))));

        for expected in 1..=5 {
            settings.write().set_last_elapsed(Some(event(&settings).fired_at));
            assert_eq!(launcher.notify(&event(&settings)).await, Ok(()));
            let current = settings.read();
            assert_eq!(current.consecutive_failures(), Ok(Some(expected)));
            assert_eq!(current.last_elapsed(), Ok(None));
            assert_eq!(current.date_updated(), Ok(Some(event(&settings).fired_at)));
        }

        let err = launcher.notify(&event(&settings)).await.unwrap_err();
        assert_eq!(
            err,
            JobError::Fatal {
                name: "flaky".to_string(),
                failures: 6,
                reason: "Job failed: boom".to_string(),
            }
        );
        assert!(!settings.read().bag().contains_key("consecutiveFailures"));
    }

    #[tokio::test]
    async fn test_success_clears_counter() {
        let settings = SharedSettings::new(ScheduleSettings::new("flaky", "Timer"));
        settings.write().set_consecutive_failures(3);

        let launcher = ScheduleLauncher::new(listener_fn(|_| Ok(())));
        launcher.notify(&event(&settings)).await.unwrap();
        assert_eq!(settings.read().consecutive_failures(), Ok(None));
    }

    #[tokio::test]
    async fn test_cancellation_is_not_counted() {
        let settings = SharedSettings::new(ScheduleSettings::new("flaky", "Timer"));
        let launcher = ScheduleLauncher::new(listener_fn(|_| Err(JobError::Cancelled)));
        assert_eq!(launcher.notify(&event(&settings)).await, Ok(()));
        assert_eq!(settings.read().consecutive_failures(), Ok(None));
    }

    #[tokio::test]
    async fn test_custom_cap() {
        let settings = SharedSettings::new(ScheduleSettings::new("flaky", "Timer"));
        let launcher =
            ScheduleLauncher::with_max_failures(listener_fn(|_| Err(JobError::failed("x"))), 1);
        assert!(launcher.notify(&event(&settings)).await.is_ok());
        assert!(launcher.notify(&event(&settings)).await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_inner_fatal_passes_through() {
        let settings = SharedSettings::new(ScheduleSettings::new("flaky", "Timer"));
        settings.write().set_consecutive_failures(2);
        let launcher = ScheduleLauncher::new(listener_fn(|_| {
            Err(JobError::Fatal {
                name: "flaky".to_string(),
                failures: 0,
                reason: "unrecoverable".to_string(),
            })
        }));
        assert!(launcher.notify(&event(&settings)).await.unwrap_err().is_fatal());
        assert_eq!(settings.read().consecutive_failures(), Ok(None));
    }
}
