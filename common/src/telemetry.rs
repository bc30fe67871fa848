// Telemetry module for structured logging, metrics, and tracing

use crate::config::LogFormat;
use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const SERVICE_NAME: &str = "calendar-scheduler";

/// Initialize structured logging
///
/// This function sets up the tracing subscriber with:
/// - JSON or human-readable formatting
/// - Log levels from `RUST_LOG`, falling back to `log_level`
/// - Optional OpenTelemetry export when a collector endpoint is given
#[tracing::instrument(skip_all)]
pub fn init_logging(
    log_level: &str,
    format: LogFormat,
    tracing_endpoint: Option<&str>,
) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_filter(env_filter)
            .boxed(),
    };

    let registry = tracing_subscriber::registry().with(fmt_layer);

    if let Some(endpoint) = tracing_endpoint {
        let tracer = init_tracer(endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(
        log_level = log_level,
        log_format = ?format,
        tracing_endpoint = tracing_endpoint,
        "Structured logging initialized"
    );

    Ok(())
}

/// Initialize OpenTelemetry tracer with OTLP exporter
#[tracing::instrument(skip_all)]
fn init_tracer(endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(SERVICE_NAME);

    tracing::info!(
        endpoint = endpoint,
        "OpenTelemetry tracer initialized with OTLP exporter"
    );

    Ok(tracer)
}

/// Flush remaining spans; call on graceful shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

/// Initialize Prometheus metrics exporter
///
/// Registers:
/// - schedule_fired_total: firings dispatched, by schedule and kind
/// - schedule_failure_total: listener failures
/// - schedule_fatal_total: schedules disabled after a fatal failure
/// - schedule_skipped_total: polls skipped because a firing was in flight
/// - schedule_firing_duration_seconds: time spent notifying listeners
/// - schedule_registered / schedule_in_flight gauges
#[tracing::instrument(skip_all)]
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "schedule_fired_total",
        "Total number of schedule firings dispatched"
    );
    describe_counter!(
        "schedule_failure_total",
        "Total number of failed listener notifications"
    );
    describe_counter!(
        "schedule_fatal_total",
        "Total number of schedules disabled by a fatal failure"
    );
    describe_counter!(
        "schedule_skipped_total",
        "Polls that skipped a schedule whose previous firing was still running"
    );
    describe_histogram!(
        "schedule_firing_duration_seconds",
        "Duration of schedule firings in seconds"
    );
    describe_gauge!("schedule_registered", "Number of registered schedules");
    describe_gauge!("schedule_in_flight", "Number of firings currently running");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_firing(schedule: &str, kind: &'static str) {
    counter!("schedule_fired_total", "schedule" => schedule.to_string(), "kind" => kind).increment(1);
}

#[inline]
pub fn record_failure(schedule: &str) {
    counter!("schedule_failure_total", "schedule" => schedule.to_string()).increment(1);
}

#[inline]
pub fn record_fatal(schedule: &str) {
    counter!("schedule_fatal_total", "schedule" => schedule.to_string()).increment(1);
}

#[inline]
pub fn record_skipped(schedule: &str) {
    counter!("schedule_skipped_total", "schedule" => schedule.to_string()).increment(1);
}

#[inline]
pub fn record_firing_duration(schedule: &str, duration_seconds: f64) {
    histogram!(
        "schedule_firing_duration_seconds",
        "schedule" => schedule.to_string()
    )
    .record(duration_seconds);
}

#[inline]
pub fn update_registered(count: usize) {
    gauge!("schedule_registered").set(count as f64);
}

#[inline]
pub fn update_in_flight(count: usize) {
    gauge!("schedule_in_flight").set(count as f64);
}
