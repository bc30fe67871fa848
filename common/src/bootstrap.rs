// Bootstrap utilities for binary initialization

use crate::config::Settings;
use crate::jobs::JobRegistry;
use crate::scheduler::{
    ConfigScheduleSource, FatalFailure, ScheduleManager, ScheduleManagerConfig,
};
use crate::telemetry;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Load and validate configuration from `config_dir`
///
/// # Errors
/// Returns error if a configuration file cannot be parsed or validation fails
pub fn load_settings<P: AsRef<Path>>(config_dir: P) -> Result<Settings> {
    let config_dir = config_dir.as_ref();
    let settings = Settings::load_from_path(config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))?;
    settings
        .validate()
        .map_err(|reason| anyhow::anyhow!("Invalid configuration: {}", reason))?;
    Ok(settings)
}

/// Install logging, tracing export and the metrics endpoint
///
/// # Errors
/// Returns error if a global subscriber or exporter is already installed
pub fn init_observability(settings: &Settings) -> Result<()> {
    let observability = &settings.observability;
    telemetry::init_logging(
        &observability.log_level,
        observability.log_format,
        observability.tracing_endpoint.as_deref(),
    )
    .context("Failed to initialize logging")?;

    if let Some(port) = observability.metrics_port {
        telemetry::init_metrics(port).context("Failed to initialize metrics")?;
    }
    Ok(())
}

/// Build a manager whose schedules come from the `schedules` table
#[tracing::instrument(skip_all)]
pub fn build_manager(settings: Arc<Settings>, jobs: JobRegistry) -> ScheduleManager {
    let config = ScheduleManagerConfig::from(&settings.scheduler);
    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        schedules = settings.schedules.len(),
        "Building schedule manager"
    );
    ScheduleManager::builder()
        .config(config)
        .jobs(jobs)
        .source(Arc::new(ConfigScheduleSource::new(settings)))
        .build()
}

/// Log every fatal failure until the manager is dropped
pub fn spawn_fatal_reporter(manager: &ScheduleManager) -> Option<JoinHandle<()>> {
    let receiver = manager.take_fatal_failures()?;
    Some(tokio::spawn(report_fatal_failures(receiver)))
}

async fn report_fatal_failures(mut receiver: mpsc::UnboundedReceiver<FatalFailure>) {
    while let Some(failure) = receiver.recv().await {
        error!(
            schedule = %failure.name,
            failures = failure.failures,
            reason = %failure.reason,
            "Schedule disabled; fix the job and re-enable it"
        );
    }
}
