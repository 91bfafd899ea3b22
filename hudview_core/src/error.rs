//! Errors surfaced by the HUD session and its configuration.

use thiserror::Error;

/// Lifecycle and configuration failures.
///
/// Data availability problems (missing attributes, empty histories, stale
/// samples) are absorbed by the engines and never show up here.
#[derive(Debug, Error)]
pub enum HudError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} is not running")]
    NotRunning(&'static str),
}
