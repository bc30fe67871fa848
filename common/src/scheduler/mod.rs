// Scheduler module: registry, poll loop and listener plumbing

pub mod claims;
pub mod engine;
pub mod launcher;
pub mod listener;
pub mod registry;
pub mod source;

pub use claims::{FiringClaim, FiringClaims};
pub use engine::{
    FatalFailure, RefreshSummary, ScheduleManager, ScheduleManagerBuilder, ScheduleManagerConfig,
    TickReport,
};
pub use launcher::{ScheduleLauncher, DEFAULT_MAX_CONSECUTIVE_FAILURES};
pub use listener::{
    listener_fn, EventKind, FnListener, ListenerSet, ScheduleEvent, ScheduleListener,
    SubscriptionId,
};
pub use registry::{Schedule, ScheduleCollection};
pub use source::{ConfigScheduleSource, ScheduleSource, StaticScheduleSource};
