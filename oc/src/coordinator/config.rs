//! Coordinator configuration

use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Initial max number of simultaneously active operations
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Command channel buffer between handles and the actor
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Broadcast capacity of the coarse event bus
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_channel_buffer() -> usize {
    256
}

fn default_event_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            channel_buffer: default_channel_buffer(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl CoordinatorConfig {
    /// Config with a given capacity and default channel sizes
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.channel_buffer, 256);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig = serde_yaml::from_str("max-concurrent: 1").unwrap();
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.channel_buffer, 256);
    }

    #[test]
    fn test_with_max_concurrent() {
        let config = CoordinatorConfig::with_max_concurrent(7);
        assert_eq!(config.max_concurrent, 7);
        assert_eq!(config.event_capacity, CoordinatorConfig::default().event_capacity);
    }
}
