// Elapsed/expired notifications and subscription lists

use crate::errors::JobError;
use crate::settings::SharedSettings;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Elapsed,
    Expired,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Elapsed => "elapsed",
            EventKind::Expired => "expired",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a listener receives for one firing
#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    pub schedule: String,
    pub kind: EventKind,
    /// Live settings of the schedule; writes are seen by the next poll
    pub settings: SharedSettings,
    pub fired_at: NaiveDateTime,
    pub firing_id: Uuid,
}

/// Callback run when a schedule elapses or expires.
///
/// Returning [`JobError::Cancelled`] is never counted as a failure.
/// Returning [`JobError::Fatal`] disables the schedule.
#[async_trait]
pub trait ScheduleListener: Send + Sync {
    async fn notify(&self, event: &ScheduleEvent) -> Result<(), JobError>;
}

/// Adapts a synchronous closure into a listener
pub struct FnListener<F>(F);

#[async_trait]
impl<F> ScheduleListener for FnListener<F>
where
    F: Fn(&ScheduleEvent) -> Result<(), JobError> + Send + Sync,
{
    async fn notify(&self, event: &ScheduleEvent) -> Result<(), JobError> {
        (self.0)(event)
    }
}

pub fn listener_fn<F>(f: F) -> Arc<dyn ScheduleListener>
where
    F: Fn(&ScheduleEvent) -> Result<(), JobError> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

/// Handle returned by every subscribe call; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Ordered list of subscribed listeners
#[derive(Default)]
pub struct ListenerSet {
    entries: Mutex<Vec<(SubscriptionId, Arc<dyn ScheduleListener>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ScheduleListener>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns false if `id` was not subscribed here
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current listeners so notification runs without the lock
    pub fn snapshot(&self) -> Vec<Arc<dyn ScheduleListener>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}
