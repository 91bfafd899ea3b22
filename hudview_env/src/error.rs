//! Error types for the hudview environment abstraction.

use thiserror::Error;

use crate::types::HandleId;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A display handle was used after release or was never issued
    #[error("Display handle not found: {0}")]
    HandleNotFound(HandleId),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a context error.
    pub fn context(msg: impl Into<String>) -> Self {
        Self::ContextError(msg.into())
    }
}
