//! Coordination settings

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{CoreError, Result};
use crate::selection::SelectionMode;

/// Tunables shared by the bus, the store and the managers built on top
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Undo depth of the store
    pub max_store_history: usize,

    /// Undo depth of the selection manager (independent of the store)
    pub max_selection_history: usize,

    /// Number of emitted events kept for debugging and replay
    pub max_event_history: usize,

    /// Hover debounce before a highlight is applied
    #[serde(deserialize_with = "deserialize_duration")]
    pub highlight_delay: Duration,

    /// Mode the selection manager starts in
    pub default_mode: SelectionMode,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_store_history: 50,
            max_selection_history: 20,
            max_event_history: 100,
            highlight_delay: Duration::from_millis(100),
            default_mode: SelectionMode::Multi,
        }
    }
}

impl CoreConfig {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_store_history == 0 {
            return Err(CoreError::Config("maxStoreHistory must be at least 1".to_string()));
        }
        if self.max_selection_history == 0 {
            return Err(CoreError::Config("maxSelectionHistory must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.max_store_history, 50);
        assert_eq!(config.max_selection_history, 20);
        assert_eq!(config.max_event_history, 100);
        assert_eq!(config.default_mode, SelectionMode::Multi);
    }

    #[test]
    fn test_partial_override() {
        let config = CoreConfig::from_json_str(
            r#"{"highlightDelay": "250ms", "defaultMode": "brush"}"#,
        )
        .unwrap();
        assert_eq!(config.highlight_delay, Duration::from_millis(250));
        assert_eq!(config.default_mode, SelectionMode::Brush);
        assert_eq!(config.max_store_history, 50);
    }

    #[test]
    fn test_rejects_zero_history() {
        let err = CoreConfig::from_json_str(r#"{"maxStoreHistory": 0}"#).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_duration() {
        assert!(CoreConfig::from_json_str(r#"{"highlightDelay": "soon"}"#).is_err());
    }
}
