// Integration tests for the calendar scheduler
// These tests drive the real poll loop from a configuration directory on disk

use chrono::Local;
use common::bootstrap;
use common::format::format_time;
use common::jobs::JobRegistry;
use common::scheduler::{listener_fn, EventKind, ScheduleEvent};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Helper function to write a configuration directory
fn write_config(dir: &Path, body: &str) {
    let mut file =
        std::fs::File::create(dir.join("default.toml")).expect("Failed to create config file");
    file.write_all(body.as_bytes())
        .expect("Failed to write config file");
}

/// Helper function to wait until `count` firings of `kind` were recorded per schedule
async fn wait_for_firings(
    seen: &Mutex<Vec<(String, EventKind)>>,
    schedule: &str,
    kind: EventKind,
    count: usize,
    timeout_secs: u64,
) -> Result<(), String> {
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    loop {
        let observed = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, k)| name == schedule && *k == kind)
            .count();
        if observed >= count {
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(format!(
                "Timeout waiting for {} {} firings of {} (saw {})",
                count, kind, schedule, observed
            ));
        }
        sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// End-to-end: configuration on disk, real clock, running loop, graceful stop
    #[tokio::test]
    async fn test_configured_schedules_fire_through_running_loop() {
        let dir = tempfile::tempdir().unwrap();
        let time_of_day = format_time(Local::now().time());
        write_config(
            dir.path(),
            &format!(
                r#"
[scheduler]
poll_interval_ms = 50
shutdown_grace_seconds = 5

[observability]
log_level = "debug"
log_format = "pretty"

[[schedules]]
name = "heartbeat"
type = "Recurring"
subType = "log"

[[schedules]]
name = "morning-report"
type = "Daily"
timeOfDay = "{time_of_day}"
dayOfMonth = "AllDays"

[[schedules]]
name = "ended-campaign"
type = "Recurring"
dateRange = "01/01/2001 - 12/31/2001"

[[schedules]]
name = "paused"
type = "Timer"
frequency = "00:00:01"
enabled = "False"
"#
            ),
        );

        let settings = Arc::new(bootstrap::load_settings(dir.path()).unwrap());
        assert_eq!(settings.schedules.len(), 4);

        let manager =
            bootstrap::build_manager(Arc::clone(&settings), JobRegistry::with_builtin_jobs());
        let seen: Arc<Mutex<Vec<(String, EventKind)>>> = Arc::new(Mutex::new(Vec::new()));
        let record = |seen: &Arc<Mutex<Vec<(String, EventKind)>>>| {
            let seen = Arc::clone(seen);
            listener_fn(move |event: &ScheduleEvent| {
                seen.lock()
                    .unwrap()
                    .push((event.schedule.clone(), event.kind));
                Ok(())
            })
        };
        manager.notify_elapsed(record(&seen));
        manager.notify_expired(record(&seen));

        let runner = manager.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        wait_for_firings(&seen, "heartbeat", EventKind::Elapsed, 3, 10)
            .await
            .unwrap();
        wait_for_firings(&seen, "morning-report", EventKind::Elapsed, 1, 10)
            .await
            .unwrap();
        wait_for_firings(&seen, "ended-campaign", EventKind::Expired, 1, 10)
            .await
            .unwrap();

        manager.stop();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("Scheduler did not stop in time")
            .unwrap();

        let firings: HashMap<String, usize> =
            seen.lock()
                .unwrap()
                .iter()
                .fold(HashMap::new(), |mut acc, (name, _)| {
                    *acc.entry(name.clone()).or_default() += 1;
                    acc
                });
        // A daily schedule fires once per day however often the loop polls
        assert_eq!(firings.get("morning-report"), Some(&1));
        assert_eq!(firings.get("ended-campaign"), Some(&1));
        assert_eq!(firings.get("paused"), None);

        // Expired schedules leave the registry; the rest stay registered
        assert!(manager.get_schedule("ended-campaign").is_none());
        assert!(manager.get_schedule("heartbeat").is_some());
        let report = manager.get_schedule("morning-report").unwrap();
        assert!(report.settings().read().last_elapsed().unwrap().is_some());
    }

    /// A definition with an unknown type is skipped without stopping the others
    #[tokio::test]
    async fn test_unknown_schedule_type_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
[[schedules]]
name = "good"
type = "Timer"
frequency = "00:05:00"

[[schedules]]
name = "bad"
type = "Fortnightly"
"#,
        );

        let settings = Arc::new(bootstrap::load_settings(dir.path()).unwrap());
        let manager = bootstrap::build_manager(settings, JobRegistry::with_builtin_jobs());

        let names: Vec<String> = manager
            .schedules()
            .iter()
            .map(|schedule| schedule.name().to_string())
            .collect();
        assert_eq!(names, vec!["good".to_string()]);
    }

    /// Environment variables override file values
    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "[scheduler]\npoll_interval_ms = 1000\n");

        std::env::set_var("APP__SCHEDULER__MAX_CONCURRENT_FIRINGS", "7");
        let settings = bootstrap::load_settings(dir.path()).unwrap();
        std::env::remove_var("APP__SCHEDULER__MAX_CONCURRENT_FIRINGS");

        assert_eq!(settings.scheduler.poll_interval_ms, 1000);
        assert_eq!(settings.scheduler.max_concurrent_firings, 7);
    }
}
