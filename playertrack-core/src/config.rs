//! Tracker configuration.
//!
//! Stored as pretty-printed JSON. Missing fields fall back to defaults, so
//! an empty object is a valid configuration file.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

/// Default distance (blocks) an entity must move to open a new interval.
pub const DEFAULT_MIN_DISTANCE: u32 = 16;

/// Largest accepted `min_distance`, the radius of a full-size world.
pub const MAX_MIN_DISTANCE: u32 = 30_000_000;

/// Default seconds between samples.
pub const DEFAULT_FREQUENCY_SECS: u64 = 30;

/// Default upper bound on a single sample's store work.
pub const DEFAULT_SAMPLE_TIMEOUT_MS: u64 = 5_000;

/// Default database file.
pub const DEFAULT_DATABASE: &str = "playertrack.db";

/// Environment variable overriding `min_distance`.
pub const ENV_MIN_DISTANCE: &str = "PLAYERTRACK_MIN_DISTANCE";

/// Environment variable overriding `frequency_secs`.
pub const ENV_FREQUENCY: &str = "PLAYERTRACK_FREQUENCY";

/// Errors from loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuration for the tracking subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Blocks an entity must move from an interval's anchor to open a new one.
    pub min_distance: u32,

    /// Seconds between samples.
    pub frequency_secs: u64,

    /// Milliseconds a single sample may spend before it is abandoned.
    pub sample_timeout_ms: u64,

    /// SQLite database file.
    pub database: PathBuf,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_MIN_DISTANCE,
            frequency_secs: DEFAULT_FREQUENCY_SECS,
            sample_timeout_ms: DEFAULT_SAMPLE_TIMEOUT_MS,
            database: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

impl TrackConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum distance for a new interval.
    pub fn with_min_distance(mut self, blocks: u32) -> Self {
        self.min_distance = blocks;
        self
    }

    /// Set the sampling frequency.
    pub fn with_frequency_secs(mut self, secs: u64) -> Self {
        self.frequency_secs = secs;
        self
    }

    /// Set the per-sample timeout.
    pub fn with_sample_timeout_ms(mut self, millis: u64) -> Self {
        self.sample_timeout_ms = millis;
        self
    }

    /// Set the database file.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = path.into();
        self
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_secs)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    /// Check values that would make the scheduler misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "frequency_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.min_distance > MAX_MIN_DISTANCE {
            return Err(ConfigError::Invalid {
                field: "min_distance",
                reason: format!("must be at most {MAX_MIN_DISTANCE} blocks"),
            });
        }
        if self.sample_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sample_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Load and validate a configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, writing the defaults first if it is absent.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::metadata(path).await {
            Ok(_) => Self::load(path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path).await?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Apply overrides from `PLAYERTRACK_MIN_DISTANCE` and `PLAYERTRACK_FREQUENCY`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        let min_distance = std::env::var(ENV_MIN_DISTANCE).ok();
        let frequency = std::env::var(ENV_FREQUENCY).ok();
        self.with_overrides(min_distance.as_deref(), frequency.as_deref())
    }

    /// Apply textual overrides, as read from the environment.
    pub fn with_overrides(
        mut self,
        min_distance: Option<&str>,
        frequency_secs: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = min_distance {
            self.min_distance = value.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "min_distance",
                reason: format!("{value:?} is not a non-negative integer"),
            })?;
        }
        if let Some(value) = frequency_secs {
            self.frequency_secs = value.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "frequency_secs",
                reason: format!("{value:?} is not a non-negative integer"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }
}
