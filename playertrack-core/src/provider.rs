//! Sources of live entity positions.
//!
//! The scheduler asks an [`EntityProvider`] for a snapshot of every active
//! entity once per tick. A game server integration implements the trait
//! directly; [`SnapshotFileProvider`] reads the snapshot from a JSON file
//! that some other process keeps up to date.

use crate::interval::Position;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from reading active entities.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One active entity as seen at sampling time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEntity {
    /// Entity identifier (player name).
    pub entity: String,

    /// World the entity is in.
    pub world: String,

    /// Block the entity is standing in.
    pub position: Position,
}

impl ActiveEntity {
    pub fn new(entity: impl Into<String>, world: impl Into<String>, position: Position) -> Self {
        Self {
            entity: entity.into(),
            world: world.into(),
            position,
        }
    }
}

/// Snapshot source for the currently active entities.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// List every active entity with its world and position.
    ///
    /// Must not have side effects; it is called once per tick.
    async fn active_entities(&self) -> Result<Vec<ActiveEntity>, ProviderError>;
}

/// Reads active entities from a JSON snapshot file on every call.
///
/// The file holds an array of objects with raw (possibly fractional)
/// coordinates:
///
/// ```json
/// [{ "entity": "Steve", "world": "world", "x": 10.5, "y": 64.0, "z": -3.2 }]
/// ```
///
/// A missing file means nobody is online.
#[derive(Debug, Clone)]
pub struct SnapshotFileProvider {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    entity: String,
    world: String,
    x: f64,
    y: f64,
    z: f64,
}

impl SnapshotFileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EntityProvider for SnapshotFileProvider {
    async fn active_entities(&self) -> Result<Vec<ActiveEntity>, ProviderError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries: Vec<SnapshotEntry> = serde_json::from_str(&content)?;
        Ok(entries
            .into_iter()
            .map(|e| ActiveEntity {
                entity: e.entity,
                world: e.world,
                position: Position::from_coords(e.x, e.y, e.z),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_file_floors_coordinates() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("players.json");
        std::fs::write(
            &path,
            r#"[
                {"entity": "Steve", "world": "world", "x": 10.5, "y": 64.0, "z": -3.2},
                {"entity": "Alex", "world": "world_nether", "x": -0.1, "y": 32.9, "z": 7}
            ]"#,
        )
        .unwrap();

        let provider = SnapshotFileProvider::new(&path);
        let entities = provider.active_entities().await.unwrap();

        assert_eq!(
            entities,
            vec![
                ActiveEntity::new("Steve", "world", Position::new(10, 64, -4)),
                ActiveEntity::new("Alex", "world_nether", Position::new(-1, 32, 7)),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_snapshot_means_nobody_online() {
        let temp_dir = TempDir::new().unwrap();
        let provider = SnapshotFileProvider::new(temp_dir.path().join("absent.json"));
        assert!(provider.active_entities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("players.json");
        std::fs::write(&path, "{ not json").unwrap();

        let provider = SnapshotFileProvider::new(&path);
        assert!(matches!(
            provider.active_entities().await,
            Err(ProviderError::Json(_))
        ));
    }
}
