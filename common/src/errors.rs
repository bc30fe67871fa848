// Error handling framework for settings access, schedule construction and job firing

use thiserror::Error;

/// Errors raised while reading or converting a value held in a settings bag
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Missing required setting: {0}")]
    MissingKey(String),

    #[error("Invalid value '{value}' for setting '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl SettingsError {
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Schedule-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid day-of-month expression '{expression}': unrecognized token '{token}'")]
    InvalidDayOfMonth { expression: String, token: String },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Cannot create schedule of type '{type_name}'")]
    CannotCreate { type_name: String },

    #[error("Schedule already registered: {0}")]
    DuplicateSchedule(String),

    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Errors a job listener reports back to the firing unit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(String),

    /// Cooperative cancellation; never counted as a failure.
    #[error("Job cancelled")]
    Cancelled,

    #[error("Firing timed out after {0} seconds")]
    Timeout(u64),

    #[error("Schedule '{name}' disabled after {failures} consecutive failures: {reason}")]
    Fatal {
        name: String,
        failures: u32,
        reason: String,
    },
}

impl JobError {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobError::Failed(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, JobError::Fatal { .. })
    }
}

impl From<ScheduleError> for JobError {
    fn from(err: ScheduleError) -> Self {
        JobError::Failed(err.to_string())
    }
}

impl From<SettingsError> for JobError {
    fn from(err: SettingsError) -> Self {
        JobError::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_day_of_month_display() {
        let err = ScheduleError::InvalidDayOfMonth {
            expression: "AllDays-Bogus".to_string(),
            token: "Bogus".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AllDays-Bogus"));
        assert!(msg.contains("'Bogus'"));
    }

    #[test]
    fn test_settings_error_converts_into_schedule_error() {
        let err: ScheduleError = SettingsError::MissingKey("name".to_string()).into();
        assert_eq!(err.to_string(), "Missing required setting: name");
    }

    #[test]
    fn test_fatal_job_error() {
        let err = JobError::Fatal {
            name: "backup".to_string(),
            failures: 6,
            reason: "disk full".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("6 consecutive failures"));
        assert!(!JobError::Cancelled.is_fatal());
    }
}
