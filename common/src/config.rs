// Configuration management with layered configuration (file, env)

use crate::settings::{ScheduleSettings, SettingsBag};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// One string map per schedule, in the settings-key format
    #[serde(default)]
    pub schedules: Vec<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrent_firings")]
    pub max_concurrent_firings: usize,
    /// Unset means a firing may run forever while holding its claim
    #[serde(default)]
    pub firing_timeout_seconds: Option<u64>,
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_true")]
    pub remove_expired: bool,
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

fn default_poll_interval_ms() -> u64 {
    5_500
}

fn default_max_concurrent_firings() -> usize {
    64
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_shutdown_grace_seconds() -> u64 {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_firings: default_max_concurrent_firings(),
            firing_timeout_seconds: None,
            max_consecutive_failures: default_max_consecutive_failures(),
            remove_expired: true,
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub metrics_port: Option<u16>,
    #[serde(default)]
    pub tracing_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// The `schedules` table as schedule settings, in file order
    pub fn schedule_settings(&self) -> Vec<ScheduleSettings> {
        self.schedules
            .iter()
            .map(|entry| {
                entry
                    .iter()
                    .collect::<SettingsBag>()
                    .into()
            })
            .collect()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err("Scheduler poll_interval_ms must be greater than 0".to_string());
        }
        if self.scheduler.max_concurrent_firings == 0 {
            return Err("Scheduler max_concurrent_firings must be greater than 0".to_string());
        }
        if self.scheduler.max_consecutive_failures == 0 {
            return Err("Scheduler max_consecutive_failures must be greater than 0".to_string());
        }
        if self.scheduler.firing_timeout_seconds == Some(0) {
            return Err("Scheduler firing_timeout_seconds must be greater than 0 when set".to_string());
        }

        let mut seen = HashSet::new();
        for (index, schedule) in self.schedule_settings().iter().enumerate() {
            let name = schedule
                .name()
                .map_err(|_| format!("Schedule #{} has no name", index + 1))?;
            schedule
                .schedule_type()
                .map_err(|_| format!("Schedule '{}' has no type", name))?;
            if !seen.insert(name.to_lowercase()) {
                return Err(format!("Schedule '{}' is defined more than once", name));
            }
        }

        Ok(())
    }
}
