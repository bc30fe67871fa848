// Calendar-driven schedules: calendar expressions, triggers and the poll loop

pub mod bootstrap;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod errors;
pub mod format;
pub mod jobs;
pub mod range;
pub mod scheduler;
pub mod settings;
pub mod telemetry;
pub mod trigger;
