//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::policy::{ConflictPolicy, PolicyRule};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Coordinator limits and channel sizes
    pub coordinator: CoordinatorConfig,

    /// Conflict rules; the built-in table when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Vec<PolicyRule>>,
}

impl Config {
    /// Check values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.max_concurrent == 0 {
            return Err(eyre::eyre!("coordinator.max-concurrent must be at least 1"));
        }
        if self.coordinator.channel_buffer == 0 {
            return Err(eyre::eyre!("coordinator.channel-buffer must be at least 1"));
        }
        if self.coordinator.event_capacity == 0 {
            return Err(eyre::eyre!("coordinator.event-capacity must be at least 1"));
        }
        Ok(())
    }

    /// The conflict policy to run with
    pub fn conflict_policy(&self) -> ConflictPolicy {
        match &self.policy {
            Some(rules) => ConflictPolicy::new(rules.clone()),
            None => ConflictPolicy::default(),
        }
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .opcoord.yml
        let local_config = PathBuf::from(".opcoord.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/opcoord/opcoord.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Walks the same chain as [`Config::load`] but swallows every error.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => std::iter::once(PathBuf::from(".opcoord.yml"))
                .chain(user_config_path())
                .collect(),
        };

        candidates
            .iter()
            .filter(|path| path.exists())
            .find_map(|path| Self::parse_file(path).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::parse_file(&path)?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("opcoord").join("opcoord.yml"))
}
