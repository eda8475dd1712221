//! TrackingService - starts and stops the whole tracking subsystem.
//!
//! Wires a store and a provider into a tracker and scheduler, checks that
//! the store is reachable, and spawns the sampling task. The session map's
//! lifetime is the service's lifetime.

use crate::config::TrackConfig;
use crate::error::TrackError;
use crate::provider::EntityProvider;
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::store::{IntervalStore, StoreError};
use crate::tracker::SessionTracker;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running tracking subsystem.
pub struct TrackingService {
    handle: SchedulerHandle,
    task: JoinHandle<SessionTracker>,
    store: Arc<dyn IntervalStore>,
}

impl TrackingService {
    /// Validate the configuration, probe the store, and start sampling.
    ///
    /// Fails with [`StoreError::Unavailable`] if the store cannot answer a
    /// row count; nothing is started in that case.
    pub async fn start(
        config: &TrackConfig,
        store: Arc<dyn IntervalStore>,
        provider: Arc<dyn EntityProvider>,
    ) -> Result<Self, TrackError> {
        config.validate()?;

        let existing = store.count().await.map_err(|e| StoreError::Unavailable {
            reason: e.to_string(),
        })?;
        info!(intervals = existing, "interval store ready");

        let tracker = SessionTracker::new(Arc::clone(&store), config.min_distance);
        let (handle, task) = Scheduler::from_config(config, tracker, provider).start();

        Ok(Self {
            handle,
            task,
            store,
        })
    }

    /// Control surface for the running scheduler.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn store(&self) -> &Arc<dyn IntervalStore> {
        &self.store
    }

    /// Stop sampling and wait for the current tick to finish.
    ///
    /// Returns the tracker so its final session map can be inspected.
    pub async fn shutdown(self) -> Result<SessionTracker, TrackError> {
        self.handle.stop();
        let tracker = self.task.await?;
        info!(tracked = tracker.tracked_entities(), "tracking stopped");
        Ok(tracker)
    }
}
