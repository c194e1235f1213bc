//! Top-level error type surfaced to callers of the replay engine.

use crate::config::ConfigError;
use crate::data::{LoadError, SourceError};
use thiserror::Error;

/// Fatal replay errors. Integrity and provider conditions are never errors;
/// they are published as ops events instead.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("unsupported replay mode '{0}' (expected historical, paper or live)")]
    UnsupportedMode(String),

    #[error("{feed} feed does not support mode '{mode}'")]
    ModeMismatch { feed: &'static str, mode: String },

    #[error("{0} feed does not support replay")]
    ReplayUnsupported(&'static str),
}

impl From<SourceError> for ReplayError {
    fn from(err: SourceError) -> Self {
        ReplayError::Load(LoadError::Source(err))
    }
}
