// Scheduler binary entry point

use anyhow::Result;
use common::bootstrap;
use common::jobs::JobRegistry;
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = std::env::var("APP_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let settings = Arc::new(bootstrap::load_settings(&config_dir)?);
    bootstrap::init_observability(&settings)?;

    info!(
        config_dir = %config_dir,
        schedules = settings.schedules.len(),
        "Starting calendar scheduler"
    );

    let manager = bootstrap::build_manager(Arc::clone(&settings), JobRegistry::with_builtin_jobs());
    let reporter = bootstrap::spawn_fatal_reporter(&manager);

    // Set up graceful shutdown
    let manager_for_shutdown = manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        manager_for_shutdown.stop();
    });

    manager.run().await;

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}
