// Schedule manager: the polling loop that evaluates triggers and dispatches firings

use super::claims::{FiringClaim, FiringClaims};
use super::listener::{EventKind, ListenerSet, ScheduleEvent, ScheduleListener, SubscriptionId};
use super::registry::{Schedule, ScheduleCollection};
use super::source::ScheduleSource;
use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::errors::{JobError, ScheduleError};
use crate::jobs::JobRegistry;
use crate::settings::ScheduleSettings;
use crate::telemetry;
use crate::trigger::ScheduleFactory;
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Configuration for the schedule manager
#[derive(Debug, Clone)]
pub struct ScheduleManagerConfig {
    /// Time between polls
    pub poll_interval: Duration,
    /// Firings allowed to run at once across all schedules
    pub max_concurrent_firings: usize,
    /// Cut a firing off after this long; `None` lets it run forever
    pub firing_timeout: Option<Duration>,
    /// Cap handed to the failure governor for jobs built from settings
    pub max_consecutive_failures: u32,
    /// Drop a schedule from the registry once its expired listeners ran
    pub remove_expired: bool,
    /// How long `run` waits for in-flight firings after a stop
    pub shutdown_grace: Duration,
}

impl Default for ScheduleManagerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for ScheduleManagerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_concurrent_firings: config.max_concurrent_firings,
            firing_timeout: config.firing_timeout_seconds.map(Duration::from_secs),
            max_consecutive_failures: config.max_consecutive_failures,
            remove_expired: config.remove_expired,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
        }
    }
}

/// What one poll did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Enabled schedules looked at
    pub evaluated: usize,
    /// Schedules passed over because their previous firing was still running
    pub skipped_in_flight: usize,
    pub elapsed: usize,
    pub expired: usize,
    pub dispatched: usize,
}

/// Outcome of reloading schedules from the source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub rejected: usize,
}

/// Published when a schedule is disabled by a fatal failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalFailure {
    pub name: String,
    pub failures: u32,
    pub reason: String,
}

/// Owns the registry and drives the poll loop.
///
/// Cloning is cheap; clones share the same registry and loop state.
#[derive(Clone)]
pub struct ScheduleManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ScheduleManagerConfig,
    clock: Arc<dyn Clock>,
    factory: ScheduleFactory,
    jobs: JobRegistry,
    registry: RwLock<ScheduleCollection>,
    claims: FiringClaims,
    elapsed_listeners: ListenerSet,
    expired_listeners: ListenerSet,
    source: Option<Arc<dyn ScheduleSource>>,
    loaded: AtomicBool,
    /// Names that came from the source, lowercased
    sourced: Mutex<HashSet<String>>,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
    fatal_tx: mpsc::UnboundedSender<FatalFailure>,
    fatal_rx: Mutex<Option<mpsc::UnboundedReceiver<FatalFailure>>>,
}

/// Builder for [`ScheduleManager`]
pub struct ScheduleManagerBuilder {
    config: ScheduleManagerConfig,
    clock: Arc<dyn Clock>,
    factory: ScheduleFactory,
    jobs: JobRegistry,
    source: Option<Arc<dyn ScheduleSource>>,
}

impl Default for ScheduleManagerBuilder {
    fn default() -> Self {
        Self {
            config: ScheduleManagerConfig::default(),
            clock: Arc::new(SystemClock),
            factory: ScheduleFactory::default(),
            jobs: JobRegistry::with_builtin_jobs(),
            source: None,
        }
    }
}

impl ScheduleManagerBuilder {
    pub fn config(mut self, config: ScheduleManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn factory(mut self, factory: ScheduleFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn jobs(mut self, jobs: JobRegistry) -> Self {
        self.jobs = jobs;
        self
    }

    /// Schedules are loaded from `source` on first access
    pub fn source(mut self, source: Arc<dyn ScheduleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> ScheduleManager {
        let (shutdown_tx, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_firings.max(1)));

        ScheduleManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                clock: self.clock,
                factory: self.factory,
                jobs: self.jobs,
                registry: RwLock::new(ScheduleCollection::new()),
                claims: FiringClaims::new(),
                elapsed_listeners: ListenerSet::new(),
                expired_listeners: ListenerSet::new(),
                source: self.source,
                loaded: AtomicBool::new(false),
                sourced: Mutex::new(HashSet::new()),
                permits,
                in_flight: AtomicUsize::new(0),
                shutdown_tx,
                fatal_tx,
                fatal_rx: Mutex::new(Some(fatal_rx)),
            }),
        }
    }
}

impl ScheduleManager {
    pub fn builder() -> ScheduleManagerBuilder {
        ScheduleManagerBuilder::default()
    }

    pub fn new(config: ScheduleManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::builder().config(config).clock(clock).build()
    }

    pub fn config(&self) -> &ScheduleManagerConfig {
        &self.inner.config
    }

    /// Register a schedule. Fails if the name is taken.
    pub fn add_schedule(&self, schedule: Schedule) -> Result<Arc<Schedule>, ScheduleError> {
        self.ensure_loaded();
        self.inner.insert(schedule)
    }

    /// Build a schedule from settings, attach its job listener and register it
    pub fn add_from_settings(
        &self,
        settings: ScheduleSettings,
    ) -> Result<Arc<Schedule>, ScheduleError> {
        self.ensure_loaded();
        let schedule = self.inner.build_schedule(settings)?;
        self.inner.insert(schedule)
    }

    pub fn remove_schedule(&self, name: &str) -> Result<Arc<Schedule>, ScheduleError> {
        self.ensure_loaded();
        let removed = {
            let mut registry = self.inner.write_registry();
            let removed = registry.remove(name);
            telemetry::update_registered(registry.len());
            removed
        };
        match removed {
            Some(schedule) => {
                info!(schedule = %schedule.name(), "Schedule removed");
                Ok(schedule)
            }
            None => Err(ScheduleError::ScheduleNotFound(name.to_string())),
        }
    }

    pub fn get_schedule(&self, name: &str) -> Option<Arc<Schedule>> {
        self.ensure_loaded();
        self.inner.read_registry().get(name)
    }

    /// Point-in-time copy of the registered schedules
    pub fn schedules(&self) -> Vec<Arc<Schedule>> {
        self.ensure_loaded();
        self.inner.read_registry().snapshot()
    }

    /// Subscribe to every schedule's elapsed firings
    pub fn notify_elapsed(&self, listener: Arc<dyn ScheduleListener>) -> SubscriptionId {
        self.inner.elapsed_listeners.subscribe(listener)
    }

    /// Subscribe to every schedule's expired firings
    pub fn notify_expired(&self, listener: Arc<dyn ScheduleListener>) -> SubscriptionId {
        self.inner.expired_listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.elapsed_listeners.unsubscribe(id) || self.inner.expired_listeners.unsubscribe(id)
    }

    /// Receiver for fatal failures. Only the first caller gets it.
    pub fn take_fatal_failures(&self) -> Option<mpsc::UnboundedReceiver<FatalFailure>> {
        self.inner
            .fatal_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Number of firings currently holding a claim
    pub fn in_flight(&self) -> usize {
        self.inner.claims.len()
    }

    fn ensure_loaded(&self) {
        if self.inner.source.is_none() || self.inner.loaded.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.refresh() {
            error!(error = %err, "Failed to load schedules");
        }
    }

    /// Reload from the source and reconcile by name.
    ///
    /// Existing schedules are reconfigured in place and keep their listeners.
    /// New names are added; names the source no longer lists are removed.
    /// A definition that fails to build is logged and skipped.
    #[instrument(skip(self))]
    pub fn refresh(&self) -> Result<RefreshSummary, ScheduleError> {
        let Some(source) = &self.inner.source else {
            return Ok(RefreshSummary::default());
        };
        self.inner.loaded.store(true, Ordering::SeqCst);
        let definitions = source.load()?;

        let mut summary = RefreshSummary::default();
        let mut seen = HashSet::new();

        for settings in definitions {
            let name = match settings.name() {
                Ok(name) => name.to_string(),
                Err(err) => {
                    warn!(error = %err, "Skipping schedule definition without a name");
                    summary.rejected += 1;
                    continue;
                }
            };
            if !seen.insert(name.to_lowercase()) {
                warn!(schedule = %name, "Skipping duplicate schedule definition");
                summary.rejected += 1;
                continue;
            }

            let existing = self.inner.read_registry().get(&name);
            let outcome = match existing {
                Some(schedule) => schedule
                    .reconfigure(settings, &self.inner.factory)
                    .map(|()| summary.updated += 1),
                None => self
                    .inner
                    .build_schedule(settings)
                    .and_then(|schedule| self.inner.insert(schedule))
                    .map(|_| summary.added += 1),
            };
            if let Err(err) = outcome {
                warn!(schedule = %name, error = %err, "Skipping schedule that failed to build");
                summary.rejected += 1;
            }
        }

        let vanished: Vec<String> = {
            let mut sourced = self
                .inner
                .sourced
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let vanished = sourced.difference(&seen).cloned().collect();
            *sourced = seen;
            vanished
        };
        {
            let mut registry = self.inner.write_registry();
            for name in vanished {
                if registry.remove(&name).is_some() {
                    info!(schedule = %name, "Schedule no longer configured, removed");
                    summary.removed += 1;
                }
            }
            telemetry::update_registered(registry.len());
        }

        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            rejected = summary.rejected,
            "Schedules refreshed"
        );
        Ok(summary)
    }

    /// Evaluate every enabled schedule once and dispatch the due ones.
    ///
    /// Must be called from within a Tokio runtime; firings are spawned onto it.
    #[instrument(skip(self))]
    pub fn poll_once(&self) -> TickReport {
        self.ensure_loaded();
        let now = self.inner.clock.now();
        let schedules = self.inner.read_registry().snapshot();
        let mut report = TickReport::default();

        for schedule in schedules {
            if !schedule.is_enabled() {
                continue;
            }
            report.evaluated += 1;

            let Some(claim) = self.inner.claims.try_claim(schedule.name()) else {
                debug!(schedule = %schedule.name(), "Previous firing still running, skipping");
                telemetry::record_skipped(schedule.name());
                report.skipped_in_flight += 1;
                continue;
            };

            let elapsed = schedule.has_elapsed(now);
            let expired = schedule.has_expired(now);
            if elapsed {
                schedule.mark_elapsed(now);
                report.elapsed += 1;
            }
            if expired {
                schedule.mark_expired(now);
                report.expired += 1;
            }
            if elapsed || expired {
                self.dispatch(schedule, claim, now, elapsed, expired);
                report.dispatched += 1;
            }
        }

        debug!(
            evaluated = report.evaluated,
            skipped_in_flight = report.skipped_in_flight,
            dispatched = report.dispatched,
            "Poll complete"
        );
        report
    }

    fn dispatch(
        &self,
        schedule: Arc<Schedule>,
        claim: FiringClaim,
        now: NaiveDateTime,
        elapsed: bool,
        expired: bool,
    ) {
        let inner = Arc::clone(&self.inner);
        let firing_id = Uuid::new_v4();
        let span = info_span!(
            "schedule_firing",
            schedule = %schedule.name(),
            firing_id = %firing_id,
            elapsed,
            expired
        );

        tokio::spawn(
            async move {
                // Released on every exit path, including a panicking listener
                let _claim = claim;
                let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                    return;
                };
                inner.fire(&schedule, firing_id, now, elapsed, expired).await;
            }
            .instrument(span),
        );
    }

    /// Run the poll loop until [`stop`](Self::stop) is called
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            max_concurrent_firings = self.inner.config.max_concurrent_firings,
            "Starting schedule manager"
        );
        self.ensure_loaded();

        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let mut poll_interval = interval(self.inner.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let stopped = *shutdown_rx.borrow_and_update();
            if stopped {
                break;
            }
            tokio::select! {
                _ = poll_interval.tick() => {
                    let report = self.poll_once();
                    if report.dispatched > 0 {
                        info!(
                            dispatched = report.dispatched,
                            skipped_in_flight = report.skipped_in_flight,
                            "Dispatched due schedules"
                        );
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Shutdown signal received, waiting for in-flight firings");
        if !self.wait_for_idle(self.inner.config.shutdown_grace).await {
            warn!(
                in_flight = self.in_flight(),
                "Firings still running after shutdown grace period"
            );
        }
        info!("Schedule manager stopped");
    }

    /// Ask the loop to exit at its next wake-up
    pub fn stop(&self) {
        info!("Stopping schedule manager");
        self.inner.shutdown_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Wait until no firing holds a claim. Returns false on timeout.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.inner.claims.is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

impl fmt::Debug for ScheduleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleManager")
            .field("config", &self.inner.config)
            .field("schedules", &self.inner.read_registry().names())
            .field("in_flight", &self.inner.claims.len())
            .finish()
    }
}

impl ManagerInner {
    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, ScheduleCollection> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, ScheduleCollection> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_schedule(&self, settings: ScheduleSettings) -> Result<Schedule, ScheduleError> {
        let job = self
            .jobs
            .build_listener(&settings, self.config.max_consecutive_failures)?;
        let schedule = Schedule::from_settings(settings, &self.factory)?;
        if let Some(job) = job {
            schedule.on_elapsed(job);
        }
        Ok(schedule)
    }

    fn insert(&self, schedule: Schedule) -> Result<Arc<Schedule>, ScheduleError> {
        schedule.mark_initialized(self.clock.now());
        let schedule = Arc::new(schedule);
        let mut registry = self.write_registry();
        registry.add(Arc::clone(&schedule))?;
        telemetry::update_registered(registry.len());
        info!(
            schedule = %schedule.name(),
            schedule_type = schedule.type_name(),
            "Schedule registered"
        );
        Ok(schedule)
    }

    async fn fire(
        &self,
        schedule: &Arc<Schedule>,
        firing_id: Uuid,
        now: NaiveDateTime,
        elapsed: bool,
        expired: bool,
    ) {
        let in_flight = InFlight::enter(&self.in_flight);
        let started = Instant::now();

        let notify_all = async {
            if elapsed {
                self.notify(schedule, EventKind::Elapsed, firing_id, now)
                    .await?;
            }
            if expired {
                self.notify(schedule, EventKind::Expired, firing_id, now)
                    .await?;
            }
            Ok::<(), JobError>(())
        };
        let outcome = match self.config.firing_timeout {
            Some(limit) => tokio::time::timeout(limit, notify_all)
                .await
                .unwrap_or(Err(JobError::Timeout(limit.as_secs()))),
            None => notify_all.await,
        };

        telemetry::record_firing_duration(schedule.name(), started.elapsed().as_secs_f64());
        drop(in_flight);

        match outcome {
            Ok(()) => {}
            Err(JobError::Fatal {
                failures, reason, ..
            }) => self.disable(schedule, failures, reason, now),
            Err(err) => {
                warn!(schedule = %schedule.name(), error = %err, "Firing did not complete");
                telemetry::record_failure(schedule.name());
            }
        }

        if expired && self.config.remove_expired {
            let mut registry = self.write_registry();
            if registry.remove_entry(schedule) {
                telemetry::update_registered(registry.len());
                info!(schedule = %schedule.name(), "Expired schedule removed");
            }
        }
    }

    /// Global listeners first, then the schedule's own. Only a fatal error stops the chain.
    async fn notify(
        &self,
        schedule: &Arc<Schedule>,
        kind: EventKind,
        firing_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<(), JobError> {
        let (global, own) = match kind {
            EventKind::Elapsed => (&self.elapsed_listeners, schedule.elapsed_listeners()),
            EventKind::Expired => (&self.expired_listeners, schedule.expired_listeners()),
        };
        let listeners: Vec<_> = global.snapshot().into_iter().chain(own.snapshot()).collect();

        let event = ScheduleEvent {
            schedule: schedule.name().to_string(),
            kind,
            settings: schedule.settings().clone(),
            fired_at: now,
            firing_id,
        };
        telemetry::record_firing(schedule.name(), kind.as_str());
        info!(
            schedule = %event.schedule,
            kind = %kind,
            listeners = listeners.len(),
            "Schedule firing"
        );

        for listener in listeners {
            match listener.notify(&event).await {
                Ok(()) => {}
                Err(fatal @ JobError::Fatal { .. }) => return Err(fatal),
                Err(JobError::Cancelled) => {
                    debug!(schedule = %event.schedule, "Listener cancelled");
                }
                Err(err) => {
                    warn!(schedule = %event.schedule, kind = %kind, error = %err, "Listener failed");
                    telemetry::record_failure(&event.schedule);
                }
            }
        }
        Ok(())
    }

    fn disable(&self, schedule: &Schedule, failures: u32, reason: String, now: NaiveDateTime) {
        {
            let mut settings = schedule.settings().write();
            settings.set_enabled(false);
            settings.set_disabled_at(now);
            settings.set_date_updated(now);
        }
        telemetry::record_fatal(schedule.name());
        error!(
            schedule = %schedule.name(),
            failures,
            reason = %reason,
            "Schedule disabled after fatal failure"
        );
        let failure = FatalFailure {
            name: schedule.name().to_string(),
            failures,
            reason,
        };
        if self.fatal_tx.send(failure).is_err() {
            debug!("Fatal failure receiver dropped");
        }
    }
}

/// Counts one running firing; the count drops again even if a listener panics
struct InFlight<'a> {
    count: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        telemetry::update_in_flight(count.fetch_add(1, Ordering::SeqCst) + 1);
        Self { count }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        telemetry::update_in_flight(self.count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1));
    }
}
