//! Testing utilities for the tracker.
//!
//! This module provides tools for deterministic tests:
//! - `ManualClock` for controlled timestamps
//! - `ScriptedProvider` for choosing who is online and where
//! - `FaultyStore` for injecting storage failures
//! - `TestHarness` for driving ticks against an in-memory store

use crate::clock::Clock;
use crate::interval::{IntervalId, Position, StayInterval};
use crate::provider::{ActiveEntity, EntityProvider, ProviderError};
use crate::scheduler::{Scheduler, SchedulerHandle, TickReport};
use crate::store::{IntervalStore, MemoryStore, StoreError};
use crate::tracker::SessionTracker;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A provider whose online entities are set by the test.
///
/// Entities are reported in the order they were first placed.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    entities: Mutex<Vec<ActiveEntity>>,
    fail_next: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an entity online at a position, or move it if already online.
    pub fn place(&self, entity: &str, world: &str, position: Position) {
        let mut entities = self.lock();
        match entities.iter_mut().find(|e| e.entity == entity) {
            Some(existing) => {
                existing.world = world.to_string();
                existing.position = position;
            }
            None => entities.push(ActiveEntity::new(entity, world, position)),
        }
    }

    /// Take an entity offline.
    pub fn remove(&self, entity: &str) {
        self.lock().retain(|e| e.entity != entity);
    }

    /// Make the next `active_entities` call fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ActiveEntity>> {
        self.entities
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EntityProvider for ScriptedProvider {
    async fn active_entities(&self) -> Result<Vec<ActiveEntity>, ProviderError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Io(std::io::Error::other(
                "scripted provider failure",
            )));
        }
        Ok(self.lock().clone())
    }
}

/// A [`MemoryStore`] that fails writes for chosen entities.
///
/// Writes for a failing entity return [`StoreError::Unavailable`]; reads
/// always succeed.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start failing writes for an entity.
    pub fn fail_entity(&self, entity: &str) {
        self.failing_set().insert(entity.to_string());
    }

    /// Stop failing writes for an entity.
    pub fn heal_entity(&self, entity: &str) {
        self.failing_set().remove(entity);
    }

    fn failing_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, entity: &str) -> Result<(), StoreError> {
        if self.failing_set().contains(entity) {
            return Err(StoreError::Unavailable {
                reason: format!("injected failure for {entity}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IntervalStore for FaultyStore {
    async fn create(
        &self,
        entity: &str,
        world: &str,
        position: Position,
        timestamp: i64,
    ) -> Result<IntervalId, StoreError> {
        self.check(entity)?;
        self.inner.create(entity, world, position, timestamp).await
    }

    async fn extend_stop(&self, id: IntervalId, timestamp: i64) -> Result<(), StoreError> {
        let interval = self.inner.get(id).await?;
        self.check(&interval.entity)?;
        self.inner.extend_stop(id, timestamp).await
    }

    async fn get(&self, id: IntervalId) -> Result<StayInterval, StoreError> {
        self.inner.get(id).await
    }

    async fn intervals_for(&self, entity: &str) -> Result<Vec<StayInterval>, StoreError> {
        self.inner.intervals_for(entity).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}

/// Drives a scheduler tick by tick against an in-memory store.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Scheduler,
}

impl TestHarness {
    /// Create a harness with the clock at `start` and the given threshold.
    pub fn new(min_distance: u32, start: i64) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let clock = Arc::new(ManualClock::new(start));

        let tracker = SessionTracker::new(store.clone(), min_distance);
        let scheduler = Scheduler::new(tracker, provider.clone()).with_clock(clock.clone());

        Self {
            store,
            provider,
            clock,
            scheduler,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    /// Put an entity online at block coordinates in a world.
    pub fn place(&self, entity: &str, world: &str, x: i32, y: i32, z: i32) {
        self.provider.place(entity, world, Position::new(x, y, z));
    }

    /// Advance the clock and run one tick.
    pub async fn tick_after(&mut self, secs: i64) -> TickReport {
        self.clock.advance(secs);
        self.scheduler.tick().await
    }

    /// Run one tick without moving the clock.
    pub async fn tick(&mut self) -> TickReport {
        self.scheduler.tick().await
    }

    pub fn open_interval(&self, entity: &str) -> Option<IntervalId> {
        self.scheduler.tracker().open_interval(entity)
    }

    /// The entity's open interval as stored.
    ///
    /// Panics if the entity has no open interval.
    pub async fn current(&self, entity: &str) -> StayInterval {
        let id = self
            .open_interval(entity)
            .unwrap_or_else(|| panic!("{entity} has no open interval"));
        self.store
            .get(id)
            .await
            .unwrap_or_else(|e| panic!("open interval for {entity} not stored: {e}"))
    }

    pub async fn history(&self, entity: &str) -> Vec<StayInterval> {
        self.store
            .intervals_for(entity)
            .await
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(30);
        assert_eq!(clock.now(), 130);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[tokio::test]
    async fn test_scripted_provider_moves_and_removes() {
        let provider = ScriptedProvider::new();
        provider.place("Steve", "world", Position::new(0, 0, 0));
        provider.place("Alex", "world", Position::new(1, 1, 1));
        provider.place("Steve", "world_nether", Position::new(5, 5, 5));

        let entities = provider.active_entities().await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].world, "world_nether");

        provider.remove("Steve");
        let entities = provider.active_entities().await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity, "Alex");
    }

    #[tokio::test]
    async fn test_faulty_store_fails_only_chosen_entity() {
        let store = FaultyStore::new();
        store.fail_entity("Steve");

        assert!(store.create("Steve", "world", Position::default(), 0).await.is_err());
        let alex = store.create("Alex", "world", Position::default(), 0).await.unwrap();
        assert!(store.extend_stop(alex, 10).await.is_ok());

        store.heal_entity("Steve");
        assert!(store.create("Steve", "world", Position::default(), 0).await.is_ok());
    }
}
