//! In-memory interval store.

use super::{IntervalStore, StoreError};
use crate::interval::{IntervalId, Position, StayInterval};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Interval store backed by a map in process memory.
///
/// Ids start at 1 and increase with every `create`, like an
/// autoincrement column.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    last_id: i64,
    intervals: BTreeMap<IntervalId, StayInterval>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record, as if the backing table had been wiped externally.
    ///
    /// Ids keep increasing afterwards.
    pub async fn clear(&self) {
        self.records.write().await.intervals.clear();
    }
}

#[async_trait]
impl IntervalStore for MemoryStore {
    async fn create(
        &self,
        entity: &str,
        world: &str,
        position: Position,
        timestamp: i64,
    ) -> Result<IntervalId, StoreError> {
        let mut records = self.records.write().await;
        records.last_id += 1;
        let id = IntervalId(records.last_id);

        records.intervals.insert(
            id,
            StayInterval {
                id,
                entity: entity.to_string(),
                world: world.to_string(),
                position,
                start: timestamp,
                stop: timestamp,
            },
        );
        Ok(id)
    }

    async fn extend_stop(&self, id: IntervalId, timestamp: i64) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let interval = records
            .intervals
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        interval.stop = interval.stop.max(timestamp);
        Ok(())
    }

    async fn get(&self, id: IntervalId) -> Result<StayInterval, StoreError> {
        self.records
            .read()
            .await
            .intervals
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn intervals_for(&self, entity: &str) -> Result<Vec<StayInterval>, StoreError> {
        let records = self.records.read().await;
        let mut intervals: Vec<_> = records
            .intervals
            .values()
            .filter(|i| i.entity == entity)
            .cloned()
            .collect();
        intervals.sort_by_key(|i| (i.start, i.id));
        Ok(intervals)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.intervals.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_sets_start_and_stop() {
        let store = MemoryStore::new();
        let id = store
            .create("Steve", "world", Position::new(1, 64, -3), 1_000)
            .await
            .unwrap();

        let interval = store.get(id).await.unwrap();
        assert_eq!(interval.id, IntervalId(1));
        assert_eq!(interval.entity, "Steve");
        assert_eq!(interval.world, "world");
        assert_eq!(interval.position, Position::new(1, 64, -3));
        assert_eq!(interval.start, 1_000);
        assert_eq!(interval.stop, 1_000);
    }

    #[tokio::test]
    async fn test_extend_stop_is_monotonic() {
        let store = MemoryStore::new();
        let id = store.create("Alex", "world", Position::default(), 100).await.unwrap();

        store.extend_stop(id, 160).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().stop, 160);

        store.extend_stop(id, 130).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().stop, 160);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(IntervalId(9)).await,
            Err(StoreError::NotFound(IntervalId(9)))
        ));
        assert!(matches!(
            store.extend_stop(IntervalId(9), 10).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_intervals_for_filters_and_orders() {
        let store = MemoryStore::new();
        store.create("Steve", "world", Position::default(), 300).await.unwrap();
        store.create("Alex", "world", Position::default(), 100).await.unwrap();
        store.create("Steve", "nether", Position::default(), 200).await.unwrap();

        let steve = store.intervals_for("Steve").await.unwrap();
        let starts: Vec<_> = steve.iter().map(|i| i.start).collect();
        assert_eq!(starts, vec![200, 300]);
        assert!(store.intervals_for("Notch").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_ids_increasing() {
        let store = MemoryStore::new();
        let first = store.create("Steve", "world", Position::default(), 1).await.unwrap();
        store.clear().await;
        assert_eq!(store.count().await.unwrap(), 0);

        let second = store.create("Steve", "world", Position::default(), 2).await.unwrap();
        assert!(second > first);
    }
}
