//! Harness error type.

use hudview_core::HudError;
use hudview_env::{EnvError, SubjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Unknown subject: {0}")]
    UnknownSubject(SubjectId),

    #[error("HUD error: {0}")]
    Hud(#[from] HudError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("Export error: {0}")]
    Export(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
