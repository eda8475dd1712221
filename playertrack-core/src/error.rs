//! Top-level error type for the tracking subsystem.

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by the tracking subsystem.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sample for {entity} timed out")]
    Timeout { entity: String },

    #[error("Scheduler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
