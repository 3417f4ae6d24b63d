use std::path::PathBuf;

use thiserror::Error;

/// Failure categories surfaced by this crate.
///
/// Functions return [anyhow::Result]; use `err.downcast_ref::<PgError>()` to classify.
#[derive(Debug, Error)]
pub enum PgError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("environment error: {0}")]
    Environment(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PgError {
    pub fn config(msg: impl Into<String>) -> Self { PgError::Config(msg.into()) }

    pub fn environment(msg: impl Into<String>) -> Self { PgError::Environment(msg.into()) }
}
