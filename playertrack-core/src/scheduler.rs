//! Periodic sampling of active entities.
//!
//! The [`Scheduler`] owns a [`SessionTracker`] and, once started, drives it
//! from a single tokio task: sleep for the configured period, then sample
//! every active entity unless paused, until stopped.
//!
//! Runtime control goes through a [`SchedulerHandle`]. Its flags are atomics
//! read by the sampling task, so changes land at the next tick:
//!
//! ```text
//!            start()          pause()
//! Stopped ───────────▶ Running ──────▶ Paused
//!    ▲                   │   ◀──────     │
//!    │        stop()     │   resume()    │ stop()
//!    └───────────────────┴───────────────┘
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{TrackConfig, DEFAULT_FREQUENCY_SECS, DEFAULT_SAMPLE_TIMEOUT_MS};
use crate::error::TrackError;
use crate::provider::{ActiveEntity, EntityProvider};
use crate::tracker::{Observation, SessionTracker};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Paused,
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick did no sampling (paused, or the provider failed).
    pub skipped: bool,
    /// Entities the provider reported.
    pub sampled: usize,
    /// Intervals opened for entities with no usable open interval.
    pub opened: usize,
    /// Intervals extended in place.
    pub extended: usize,
    /// Entities that moved far enough to start a new interval.
    pub relocated: usize,
    /// Samples that failed or timed out.
    pub failed: usize,
}

impl TickReport {
    fn record(&mut self, observation: Observation) {
        match observation {
            Observation::Opened(_) => self.opened += 1,
            Observation::Extended(_) => self.extended += 1,
            Observation::Relocated { .. } => self.relocated += 1,
        }
    }
}

/// Flags shared between the sampling task and its handles.
#[derive(Debug)]
struct Controls {
    running: AtomicBool,
    paused: AtomicBool,
    stopping: AtomicBool,
    frequency_secs: AtomicU64,
    min_distance: AtomicU32,
    tracked: AtomicUsize,
    wake: Notify,
}

/// Marks the scheduler running for as long as the sampling task lives.
///
/// Dropped when the task returns, panics, or is dropped unpolled.
struct RunningGuard {
    controls: Arc<Controls>,
}

impl RunningGuard {
    fn new(controls: Arc<Controls>) -> Self {
        controls.running.store(true, Ordering::Release);
        Self { controls }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.controls.running.store(false, Ordering::Release);
        if std::thread::panicking() {
            error!("sampling task panicked");
        }
    }
}

/// Cloneable control surface for a scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    controls: Arc<Controls>,
}

impl SchedulerHandle {
    /// Skip sampling on subsequent ticks. The timer keeps running.
    pub fn pause(&self) {
        self.controls.paused.store(true, Ordering::Release);
    }

    /// Resume sampling on the next tick.
    pub fn resume(&self) {
        self.controls.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.controls.paused.load(Ordering::Acquire)
    }

    /// Change the sampling period, starting with the next sleep.
    ///
    /// Zero is treated as one second.
    pub fn set_frequency(&self, secs: u64) {
        self.controls
            .frequency_secs
            .store(secs.max(1), Ordering::Release);
    }

    pub fn frequency_secs(&self) -> u64 {
        self.controls.frequency_secs.load(Ordering::Acquire)
    }

    /// Change the distance threshold, starting with the next tick.
    pub fn set_min_distance(&self, blocks: u32) {
        self.controls.min_distance.store(blocks, Ordering::Release);
    }

    pub fn min_distance(&self) -> u32 {
        self.controls.min_distance.load(Ordering::Acquire)
    }

    /// Ask the sampling task to exit.
    ///
    /// A sleeping task wakes immediately; a tick in progress is allowed to
    /// finish first.
    pub fn stop(&self) {
        self.controls.stopping.store(true, Ordering::Release);
        self.controls.wake.notify_one();
    }

    pub fn state(&self) -> SchedulerState {
        if !self.controls.running.load(Ordering::Acquire) {
            SchedulerState::Stopped
        } else if self.is_paused() {
            SchedulerState::Paused
        } else {
            SchedulerState::Running
        }
    }

    /// Entities in the tracker's session map as of the last tick.
    pub fn tracked_entities(&self) -> usize {
        self.controls.tracked.load(Ordering::Acquire)
    }
}

/// Samples active entities into a [`SessionTracker`] on a fixed period.
pub struct Scheduler {
    tracker: SessionTracker,
    provider: Arc<dyn EntityProvider>,
    clock: Arc<dyn Clock>,
    sample_timeout: Duration,
    controls: Arc<Controls>,
}

impl Scheduler {
    /// Create a stopped scheduler with default timing.
    pub fn new(tracker: SessionTracker, provider: Arc<dyn EntityProvider>) -> Self {
        let controls = Controls {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            frequency_secs: AtomicU64::new(DEFAULT_FREQUENCY_SECS),
            min_distance: AtomicU32::new(tracker.min_distance()),
            tracked: AtomicUsize::new(tracker.tracked_entities()),
            wake: Notify::new(),
        };

        Self {
            tracker,
            provider,
            clock: Arc::new(SystemClock),
            sample_timeout: Duration::from_millis(DEFAULT_SAMPLE_TIMEOUT_MS),
            controls: Arc::new(controls),
        }
    }

    /// Create a scheduler with timing and threshold taken from a configuration.
    pub fn from_config(
        config: &TrackConfig,
        tracker: SessionTracker,
        provider: Arc<dyn EntityProvider>,
    ) -> Self {
        let scheduler = Self::new(tracker, provider)
            .with_frequency(config.frequency_secs)
            .with_sample_timeout(config.sample_timeout());
        scheduler.handle().set_min_distance(config.min_distance);
        scheduler
    }

    /// Use a different clock for interval timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the sampling period in seconds.
    pub fn with_frequency(self, secs: u64) -> Self {
        self.handle().set_frequency(secs);
        self
    }

    /// Set the upper bound on one sample's store work.
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            controls: Arc::clone(&self.controls),
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Run one sampling pass.
    ///
    /// Does nothing while paused. Otherwise every active entity is sampled
    /// in turn with a single timestamp; a failing entity is logged and
    /// skipped without affecting the others.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if self.controls.paused.load(Ordering::Acquire) {
            debug!("sampling paused, skipping tick");
            report.skipped = true;
            return report;
        }

        self.tracker
            .set_min_distance(self.controls.min_distance.load(Ordering::Acquire));

        let entities = match self.provider.active_entities().await {
            Ok(entities) => entities,
            Err(e) => {
                error!(error = %e, "failed to list active entities, skipping tick");
                report.skipped = true;
                return report;
            }
        };

        let now = self.clock.now();
        report.sampled = entities.len();

        for entity in &entities {
            match self.sample(entity, now).await {
                Ok(observation) => report.record(observation),
                Err(e) => {
                    report.failed += 1;
                    warn!(entity = %entity.entity, error = %e, "sample failed");
                }
            }
        }

        self.controls
            .tracked
            .store(self.tracker.tracked_entities(), Ordering::Release);

        debug!(
            sampled = report.sampled,
            opened = report.opened,
            extended = report.extended,
            relocated = report.relocated,
            failed = report.failed,
            "tick complete"
        );
        report
    }

    async fn sample(&mut self, entity: &ActiveEntity, now: i64) -> Result<Observation, TrackError> {
        match tokio::time::timeout(self.sample_timeout, self.tracker.observe(entity, now)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TrackError::Timeout {
                entity: entity.entity.clone(),
            }),
        }
    }

    /// Spawn the sampling task.
    ///
    /// The task hands the tracker back when it exits.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<SessionTracker>) {
        let handle = self.handle();
        let guard = RunningGuard::new(Arc::clone(&self.controls));
        let task = tokio::spawn(async move {
            let _guard = guard;
            self.run().await
        });
        (handle, task)
    }

    async fn run(mut self) -> SessionTracker {
        info!(
            frequency_secs = self.controls.frequency_secs.load(Ordering::Acquire),
            min_distance = self.tracker.min_distance(),
            "sampling started"
        );

        while !self.controls.stopping.load(Ordering::Acquire) {
            let period = Duration::from_secs(self.controls.frequency_secs.load(Ordering::Acquire));

            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = self.controls.wake.notified() => {}
            }

            if self.controls.stopping.load(Ordering::Acquire) {
                break;
            }
            self.tick().await;
        }

        info!("sampling stopped");
        self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Position;
    use crate::store::MemoryStore;
    use crate::testing::{ManualClock, ScriptedProvider};

    fn scheduler() -> (Arc<ScriptedProvider>, Scheduler) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let scheduler = Scheduler::new(SessionTracker::new(store, 16), provider.clone())
            .with_clock(Arc::new(ManualClock::new(0)));
        (provider, scheduler)
    }

    #[test]
    fn test_handle_flags() {
        let (_provider, scheduler) = scheduler();
        let handle = scheduler.handle();

        assert_eq!(handle.state(), SchedulerState::Stopped);
        assert_eq!(handle.frequency_secs(), DEFAULT_FREQUENCY_SECS);
        assert_eq!(handle.min_distance(), 16);

        handle.set_frequency(0);
        assert_eq!(handle.frequency_secs(), 1);

        handle.pause();
        assert!(handle.is_paused());
        handle.resume();
        assert!(!handle.is_paused());
    }

    #[test]
    fn test_from_config() {
        let store = Arc::new(MemoryStore::new());
        let config = TrackConfig::new()
            .with_min_distance(8)
            .with_frequency_secs(10)
            .with_sample_timeout_ms(250);
        let scheduler = Scheduler::from_config(
            &config,
            SessionTracker::new(store, config.min_distance),
            Arc::new(ScriptedProvider::new()),
        );

        let handle = scheduler.handle();
        assert_eq!(handle.frequency_secs(), 10);
        assert_eq!(handle.min_distance(), 8);
        assert_eq!(scheduler.sample_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_paused_tick_is_skipped() {
        let (provider, mut scheduler) = scheduler();
        provider.place("Steve", "world", Position::new(0, 0, 0));

        scheduler.handle().pause();
        let report = scheduler.tick().await;
        assert!(report.skipped);
        assert_eq!(report.sampled, 0);
        assert_eq!(scheduler.tracker().tracked_entities(), 0);
    }

    #[tokio::test]
    async fn test_tick_reports_outcomes() {
        let (provider, mut scheduler) = scheduler();
        provider.place("Steve", "world", Position::new(0, 0, 0));
        provider.place("Alex", "world", Position::new(0, 0, 0));

        let report = scheduler.tick().await;
        assert_eq!(report.sampled, 2);
        assert_eq!(report.opened, 2);
        assert_eq!(scheduler.handle().tracked_entities(), 2);

        provider.place("Alex", "world", Position::new(100, 0, 0));
        let report = scheduler.tick().await;
        assert_eq!(report.extended, 1);
        assert_eq!(report.relocated, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_provider_failure_skips_tick() {
        let (provider, mut scheduler) = scheduler();
        provider.place("Steve", "world", Position::new(0, 0, 0));
        provider.fail_next();

        let report = scheduler.tick().await;
        assert!(report.skipped);

        let report = scheduler.tick().await;
        assert!(!report.skipped);
        assert_eq!(report.opened, 1);
    }

    #[tokio::test]
    async fn test_min_distance_from_handle_applies_on_tick() {
        let (provider, mut scheduler) = scheduler();
        provider.place("Steve", "world", Position::new(0, 0, 0));
        scheduler.tick().await;

        scheduler.handle().set_min_distance(2);
        provider.place("Steve", "world", Position::new(3, 0, 0));
        let report = scheduler.tick().await;
        assert_eq!(report.relocated, 1);
        assert_eq!(scheduler.tracker().min_distance(), 2);
    }
}
