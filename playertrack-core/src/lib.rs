//! Player position tracking with stay-interval history.
//!
//! This crate provides:
//! - Periodic sampling of active entities (players) and their positions
//! - Session tracking that turns samples into "stay" intervals
//! - SQLite and in-memory interval storage
//! - A text control surface for pausing and reconfiguring a running tracker
//!
//! # Quick Start
//!
//! ```ignore
//! use playertrack_core::{SnapshotFileProvider, SqliteStore, TrackConfig, TrackingService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TrackConfig::load_or_default("playertrack.json").await?;
//!     let store = Arc::new(SqliteStore::open(&config.database)?);
//!     let provider = Arc::new(SnapshotFileProvider::new("players.json"));
//!
//!     let service = TrackingService::start(&config, store, provider).await?;
//!     service.handle().pause();
//!     service.handle().resume();
//!
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod interval;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod testing;
pub mod tracker;

// Primary public API
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, TrackConfig};
pub use control::{ControlCommand, ControlError, Controller};
pub use error::TrackError;
pub use interval::{IntervalId, Position, StayInterval};
pub use provider::{ActiveEntity, EntityProvider, ProviderError, SnapshotFileProvider};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState, TickReport};
pub use service::TrackingService;
pub use store::{IntervalStore, MemoryStore, SqliteStore, StoreError};
pub use testing::{FaultyStore, ManualClock, ScriptedProvider, TestHarness};
pub use tracker::{Observation, SessionTracker};
