//! SQLite interval store.
//!
//! Records live in a single `player_loc` table. Every call runs on tokio's
//! blocking pool so a slow disk never stalls the sampling task directly.

use super::{IntervalStore, StoreError};
use crate::interval::{IntervalId, Position, StayInterval};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS player_loc (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        player TEXT NOT NULL,
        world TEXT NOT NULL,
        x INTEGER NOT NULL,
        y INTEGER NOT NULL,
        z INTEGER NOT NULL,
        start INTEGER NOT NULL,
        stop INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS player_loc_player ON player_loc (player);
";

/// Interval store backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::bootstrap(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Unavailable {
            reason: e.to_string(),
        })?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| StoreError::Unavailable {
                reason: format!("failed to initialize schema: {e}"),
            })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Unavailable {
                reason: "connection lock poisoned".to_string(),
            })?;
            f(&*guard)
        })
        .await?
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<StayInterval> {
    Ok(StayInterval {
        id: IntervalId(row.get(0)?),
        entity: row.get(1)?,
        world: row.get(2)?,
        position: Position::new(row.get(3)?, row.get(4)?, row.get(5)?),
        start: row.get(6)?,
        stop: row.get(7)?,
    })
}

#[async_trait]
impl IntervalStore for SqliteStore {
    async fn create(
        &self,
        entity: &str,
        world: &str,
        position: Position,
        timestamp: i64,
    ) -> Result<IntervalId, StoreError> {
        let entity = entity.to_string();
        let world = world.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO player_loc (player, world, x, y, z, start, stop)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![entity, world, position.x, position.y, position.z, timestamp],
            )?;
            Ok(IntervalId(conn.last_insert_rowid()))
        })
        .await
    }

    async fn extend_stop(&self, id: IntervalId, timestamp: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE player_loc SET stop = MAX(stop, ?2) WHERE id = ?1",
                params![id.0, timestamp],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, id: IntervalId) -> Result<StayInterval, StoreError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, player, world, x, y, z, start, stop FROM player_loc WHERE id = ?1",
                params![id.0],
                map_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn intervals_for(&self, entity: &str) -> Result<Vec<StayInterval>, StoreError> {
        let entity = entity.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, player, world, x, y, z, start, stop FROM player_loc
                 WHERE player = ?1
                 ORDER BY start ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![entity], map_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM player_loc", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_get_extend() {
        let store = SqliteStore::in_memory().expect("in-memory store");
        let id = store
            .create("Steve", "world", Position::new(-5, 70, 12), 1_000)
            .await
            .unwrap();

        let interval = store.get(id).await.unwrap();
        assert_eq!(interval.entity, "Steve");
        assert_eq!(interval.position, Position::new(-5, 70, 12));
        assert_eq!((interval.start, interval.stop), (1_000, 1_000));

        store.extend_stop(id, 1_030).await.unwrap();
        store.extend_stop(id, 1_010).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().stop, 1_030);
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.get(IntervalId(3)).await,
            Err(StoreError::NotFound(IntervalId(3)))
        ));
        assert!(matches!(
            store.extend_stop(IntervalId(3), 5).await,
            Err(StoreError::NotFound(IntervalId(3)))
        ));
    }

    #[tokio::test]
    async fn test_intervals_for_orders_by_start() {
        let store = SqliteStore::in_memory().unwrap();
        store.create("Steve", "world", Position::default(), 50).await.unwrap();
        store.create("Steve", "world", Position::default(), 10).await.unwrap();
        store.create("Alex", "world", Position::default(), 20).await.unwrap();

        let steve = store.intervals_for("Steve").await.unwrap();
        assert_eq!(steve.len(), 2);
        assert_eq!(steve[0].start, 10);
        assert_eq!(steve[1].start, 50);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("track.db");

        let id = {
            let store = SqliteStore::open(&path).expect("first open");
            store.create("Alex", "nether", Position::new(1, 2, 3), 77).await.unwrap()
        };

        let store = SqliteStore::open(&path).expect("second open");
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(id).await.unwrap().world, "nether");
    }

    #[test]
    fn test_open_unreachable_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("dir").join("track.db");
        assert!(matches!(
            SqliteStore::open(&path),
            Err(StoreError::Unavailable { .. })
        ));
    }
}
