//! Durable storage for stay intervals.
//!
//! The [`IntervalStore`] trait is the whole contract the tracker relies on:
//! create, extend the stop time, and look records up. Two backends ship with
//! the crate:
//!
//! - [`SqliteStore`] persists to the `player_loc` table
//! - [`MemoryStore`] keeps records in process memory

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::interval::{IntervalId, Position, StayInterval};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from interval storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Interval not found: {0}")]
    NotFound(IntervalId),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Persistent collection of [`StayInterval`] records.
///
/// Stores own their records; nothing else mutates them. Records are never
/// deleted or merged through this interface.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Persist a new interval with `start == stop == timestamp`.
    async fn create(
        &self,
        entity: &str,
        world: &str,
        position: Position,
        timestamp: i64,
    ) -> Result<IntervalId, StoreError>;

    /// Move the stop time of an interval forward to `timestamp`.
    ///
    /// The stop time never moves backwards. Fails with
    /// [`StoreError::NotFound`] if the record does not exist.
    async fn extend_stop(&self, id: IntervalId, timestamp: i64) -> Result<(), StoreError>;

    /// Fetch one interval by id.
    async fn get(&self, id: IntervalId) -> Result<StayInterval, StoreError>;

    /// All intervals recorded for an entity, oldest first.
    async fn intervals_for(&self, entity: &str) -> Result<Vec<StayInterval>, StoreError>;

    /// Total number of stored intervals.
    async fn count(&self) -> Result<usize, StoreError>;
}
