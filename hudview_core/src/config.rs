//! HUD configuration.

use hudview_env::LabelStyle;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::HudError;
use crate::hudview_time::DEFAULT_HISTORY_CAPACITY;

/// Tunables for the presentation layer.
///
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Samples kept per subject (default: 12)
    pub history_capacity: usize,

    /// How far behind "now" frames are rendered, in ms (default: 100)
    pub display_lag_ms: u64,

    /// Label anchor height above the subject in world units (default: 0.1)
    pub label_offset: f32,

    /// Style applied to every label
    pub label_style: LabelStyle,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            display_lag_ms: 100,
            label_offset: 0.1,
            label_style: LabelStyle::default(),
        }
    }
}

impl HudConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, HudError> {
        let config: HudConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), HudError> {
        if self.history_capacity < 2 {
            return Err(HudError::InvalidConfig(format!(
                "history_capacity must be at least 2 to interpolate, got {}",
                self.history_capacity
            )));
        }
        if !self.label_offset.is_finite() {
            return Err(HudError::InvalidConfig(
                "label_offset must be finite".to_string(),
            ));
        }
        if self.label_style.element_id.is_empty() {
            return Err(HudError::InvalidConfig(
                "label_style.element_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The display lag as a duration.
    pub fn display_lag(&self) -> Duration {
        Duration::from_millis(self.display_lag_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HudConfig::default();
        assert_eq!(config.history_capacity, 12);
        assert_eq!(config.display_lag(), Duration::from_millis(100));
        assert_eq!(config.label_style.element_id, "ship.label");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = HudConfig::from_json_str(r#"{ "display_lag_ms": 250 }"#).unwrap();
        assert_eq!(config.display_lag_ms, 250);
        assert_eq!(config.history_capacity, 12);
    }

    #[test]
    fn test_rejects_tiny_history() {
        let err = HudConfig::from_json_str(r#"{ "history_capacity": 1 }"#).unwrap_err();
        assert!(matches!(err, HudError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = HudConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, HudError::ConfigParse(_)));
    }
}
