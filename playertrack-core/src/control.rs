//! Administrative commands for a running tracker.
//!
//! Commands are plain text, case-insensitive:
//!
//! | Command                                       | Effect                         |
//! |-----------------------------------------------|--------------------------------|
//! | `pause`                                       | stop sampling (not persisted)  |
//! | `resume`                                      | resume sampling                |
//! | `freq <secs>`, `frequency <secs>`             | change and persist the period  |
//! | `dist <n>`, `distance <n>`, `mindistance <n>` | change and persist the threshold |
//!
//! Invalid input is rejected without touching the scheduler or the
//! configuration file.

use crate::config::{ConfigError, TrackConfig, MAX_MIN_DISTANCE};
use crate::scheduler::SchedulerHandle;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors from parsing or applying a control command.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("No command given")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing value for {command}")]
    MissingArgument { command: String },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidConfigValue { field: &'static str, value: String },

    #[error("Failed to save configuration: {0}")]
    Persist(#[from] ConfigError),
}

/// A parsed control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    SetFrequency(u64),
    SetMinDistance(u32),
}

impl ControlCommand {
    /// Parse one command line.
    pub fn parse(input: &str) -> Result<Self, ControlError> {
        let mut parts = input.split_whitespace();
        let name = parts.next().ok_or(ControlError::Empty)?;

        match name.to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "freq" | "frequency" => {
                let value = required(name, parts.next())?;
                match value.parse::<u64>() {
                    Ok(secs) if secs > 0 => Ok(Self::SetFrequency(secs)),
                    _ => Err(ControlError::InvalidConfigValue {
                        field: "frequency",
                        value: value.to_string(),
                    }),
                }
            }
            "dist" | "distance" | "mindist" | "mindistance" => {
                let value = required(name, parts.next())?;
                match value.parse::<u32>() {
                    Ok(blocks) if blocks <= MAX_MIN_DISTANCE => Ok(Self::SetMinDistance(blocks)),
                    _ => Err(ControlError::InvalidConfigValue {
                        field: "distance",
                        value: value.to_string(),
                    }),
                }
            }
            _ => Err(ControlError::UnknownCommand(name.to_string())),
        }
    }
}

fn required<'a>(command: &str, value: Option<&'a str>) -> Result<&'a str, ControlError> {
    value.ok_or_else(|| ControlError::MissingArgument {
        command: command.to_string(),
    })
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::SetFrequency(secs) => write!(f, "frequency {secs}"),
            Self::SetMinDistance(blocks) => write!(f, "distance {blocks}"),
        }
    }
}

/// Applies control commands to a running scheduler and its configuration.
#[derive(Debug)]
pub struct Controller {
    handle: SchedulerHandle,
    config: TrackConfig,
    config_path: Option<PathBuf>,
}

impl Controller {
    pub fn new(handle: SchedulerHandle, config: TrackConfig) -> Self {
        Self {
            handle,
            config,
            config_path: None,
        }
    }

    /// Persist frequency and distance changes to this file.
    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// Parse and apply one command line.
    pub async fn execute(&mut self, input: &str) -> Result<ControlCommand, ControlError> {
        let command = ControlCommand::parse(input)?;
        self.apply(command).await?;
        Ok(command)
    }

    /// Apply a parsed command.
    ///
    /// Frequency and distance changes are saved before they take effect, so
    /// a failed save leaves everything as it was.
    pub async fn apply(&mut self, command: ControlCommand) -> Result<(), ControlError> {
        match command {
            ControlCommand::Pause => self.handle.pause(),
            ControlCommand::Resume => self.handle.resume(),
            ControlCommand::SetFrequency(secs) => {
                let updated = self.config.clone().with_frequency_secs(secs);
                self.commit(updated).await?;
                self.handle.set_frequency(secs);
            }
            ControlCommand::SetMinDistance(blocks) => {
                let updated = self.config.clone().with_min_distance(blocks);
                self.commit(updated).await?;
                self.handle.set_min_distance(blocks);
            }
        }

        info!(command = %command, "control command applied");
        Ok(())
    }

    async fn commit(&mut self, updated: TrackConfig) -> Result<(), ControlError> {
        updated.validate()?;
        if let Some(path) = &self.config_path {
            updated.save(path).await?;
        }
        self.config = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ControlCommand::parse("pause").unwrap(), ControlCommand::Pause);
        assert_eq!(ControlCommand::parse("  RESUME ").unwrap(), ControlCommand::Resume);
        assert_eq!(
            ControlCommand::parse("freq 10").unwrap(),
            ControlCommand::SetFrequency(10)
        );
        assert_eq!(
            ControlCommand::parse("Frequency 45").unwrap(),
            ControlCommand::SetFrequency(45)
        );
        for alias in ["dist", "distance", "minDist", "minDistance"] {
            assert_eq!(
                ControlCommand::parse(&format!("{alias} 8")).unwrap(),
                ControlCommand::SetMinDistance(8)
            );
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(ControlCommand::parse(""), Err(ControlError::Empty)));
        assert!(matches!(
            ControlCommand::parse("teleport 1"),
            Err(ControlError::UnknownCommand(name)) if name == "teleport"
        ));
        assert!(matches!(
            ControlCommand::parse("frequency"),
            Err(ControlError::MissingArgument { .. })
        ));
        assert!(matches!(
            ControlCommand::parse("frequency 0"),
            Err(ControlError::InvalidConfigValue { field: "frequency", .. })
        ));
        assert!(matches!(
            ControlCommand::parse("distance -4"),
            Err(ControlError::InvalidConfigValue { field: "distance", .. })
        ));
        assert!(matches!(
            ControlCommand::parse("distance far"),
            Err(ControlError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            ControlCommand::parse("distance 4000000000"),
            Err(ControlError::InvalidConfigValue { field: "distance", .. })
        ));
        assert_eq!(
            ControlCommand::parse("distance 30000000").unwrap(),
            ControlCommand::SetMinDistance(MAX_MIN_DISTANCE)
        );
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(ControlCommand::SetFrequency(5).to_string(), "frequency 5");
        assert_eq!(ControlCommand::SetMinDistance(3).to_string(), "distance 3");
        assert_eq!(
            ControlCommand::parse(&ControlCommand::SetMinDistance(3).to_string()).unwrap(),
            ControlCommand::SetMinDistance(3)
        );
    }
}
