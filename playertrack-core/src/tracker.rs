//! Per-entity session tracking.
//!
//! The [`SessionTracker`] owns the map from entity to its open interval and
//! decides, for each sample, whether that interval is extended or a new one
//! is opened.
//!
//! Every sample of a known entity extends its open interval, even when the
//! entity has moved. The extension records that the entity was still seen
//! at this moment. If the entity is now more than `min_distance` blocks from
//! the interval's anchor position, or is in a different world, a new
//! interval is opened at the sampled position as well. Distance is always
//! measured from the anchor, never from the previous sample.
//!
//! Interval creation runs as its own task. If the caller gives up on a
//! sample (for example on a timeout) while a create is in flight, the
//! create still finishes and the next sample of that entity adopts the new
//! interval instead of creating another one.

use crate::interval::{IntervalId, StayInterval};
use crate::provider::ActiveEntity;
use crate::store::{IntervalStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

type PendingCreate = JoinHandle<Result<IntervalId, StoreError>>;

/// What a sample did to an entity's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No usable open interval existed; a new one was created.
    Opened(IntervalId),

    /// The open interval was extended and stays open.
    Extended(IntervalId),

    /// The open interval was extended one last time and a new one opened.
    Relocated {
        closed: IntervalId,
        opened: IntervalId,
    },
}

impl Observation {
    /// The interval that is open after this sample.
    pub fn interval(&self) -> IntervalId {
        match *self {
            Observation::Opened(id) | Observation::Extended(id) => id,
            Observation::Relocated { opened, .. } => opened,
        }
    }
}

/// Tracks one open interval per entity.
///
/// Entries are never removed: an entity that goes offline keeps its entry
/// until it is seen again, at which point the old interval is compared
/// against as usual.
pub struct SessionTracker {
    store: Arc<dyn IntervalStore>,
    sessions: HashMap<String, IntervalId>,
    pending: HashMap<String, PendingCreate>,
    min_distance: u32,
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTracker")
            .field("sessions", &self.sessions)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("min_distance", &self.min_distance)
            .finish_non_exhaustive()
    }
}

impl SessionTracker {
    pub fn new(store: Arc<dyn IntervalStore>, min_distance: u32) -> Self {
        Self {
            store,
            sessions: HashMap::new(),
            pending: HashMap::new(),
            min_distance,
        }
    }

    pub fn min_distance(&self) -> u32 {
        self.min_distance
    }

    pub fn set_min_distance(&mut self, blocks: u32) {
        self.min_distance = blocks;
    }

    /// The interval currently open for an entity, if any.
    pub fn open_interval(&self, entity: &str) -> Option<IntervalId> {
        self.sessions.get(entity).copied()
    }

    /// Number of entities with an entry in the session map.
    pub fn tracked_entities(&self) -> usize {
        self.sessions.len()
    }

    pub fn store(&self) -> &Arc<dyn IntervalStore> {
        &self.store
    }

    /// Record one sample taken at `now`.
    ///
    /// On a store error the session map is left as it was for this entity.
    pub async fn observe(
        &mut self,
        sample: &ActiveEntity,
        now: i64,
    ) -> Result<Observation, StoreError> {
        match self.settle(&sample.entity).await {
            Ok(Some(id)) => {
                debug!(entity = %sample.entity, interval = %id, "adopted interval from an abandoned sample");
            }
            Ok(None) => {}
            Err(e) => {
                debug!(entity = %sample.entity, error = %e, "abandoned interval creation failed");
            }
        }

        let Some(current) = self.current_interval(&sample.entity).await? else {
            let id = self.open(sample, now).await?;
            debug!(entity = %sample.entity, interval = %id, world = %sample.world, position = %sample.position, "opened interval");
            return Ok(Observation::Opened(id));
        };

        let moved = self.has_moved(&current, sample);

        match self.store.extend_stop(current.id, now).await {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => {
                debug!(entity = %sample.entity, interval = %id, "open interval vanished before extend, reopening");
                let id = self.open(sample, now).await?;
                return Ok(Observation::Opened(id));
            }
            Err(e) => return Err(e),
        }

        if !moved {
            return Ok(Observation::Extended(current.id));
        }

        let opened = self.open(sample, now).await?;
        debug!(
            entity = %sample.entity,
            closed = %current.id,
            opened = %opened,
            from = %current.position,
            to = %sample.position,
            "entity relocated"
        );
        Ok(Observation::Relocated {
            closed: current.id,
            opened,
        })
    }

    /// Fetch the entity's open interval, treating a missing record as no interval.
    async fn current_interval(&self, entity: &str) -> Result<Option<StayInterval>, StoreError> {
        let Some(&id) = self.sessions.get(entity) else {
            return Ok(None);
        };

        match self.store.get(id).await {
            Ok(interval) => Ok(Some(interval)),
            Err(StoreError::NotFound(_)) => {
                debug!(entity, interval = %id, "open interval missing from store, reopening");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn has_moved(&self, interval: &StayInterval, sample: &ActiveEntity) -> bool {
        let limit = u128::from(self.min_distance).pow(2);
        interval.world != sample.world || interval.position.distance_squared(&sample.position) > limit
    }

    async fn open(&mut self, sample: &ActiveEntity, now: i64) -> Result<IntervalId, StoreError> {
        let store = Arc::clone(&self.store);
        let entity = sample.entity.clone();
        let world = sample.world.clone();
        let position = sample.position;
        let create = tokio::spawn(async move { store.create(&entity, &world, position, now).await });

        // Registered before awaiting so a cancelled sample leaves it behind.
        self.pending.insert(sample.entity.clone(), create);
        self.settle(&sample.entity)
            .await?
            .ok_or_else(|| StoreError::Unavailable {
                reason: format!("interval creation for {} was lost", sample.entity),
            })
    }

    /// Wait for an in-flight create for this entity and make its interval
    /// the open one.
    async fn settle(&mut self, entity: &str) -> Result<Option<IntervalId>, StoreError> {
        let Some(create) = self.pending.get_mut(entity) else {
            return Ok(None);
        };
        let outcome = create.await;
        self.pending.remove(entity);

        let id = outcome??;
        self.sessions.insert(entity.to_string(), id);
        Ok(Some(id))
    }
}
