//! Error types for imgforge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Transport(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Engine build or push failure. Displays the engine message verbatim.
    #[error("{0}")]
    Build(String),

    #[error("build engine is busy: {0}")]
    EngineBusy(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
