//! Error types for context operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration")]
    Load(#[source] confy::ConfyError),

    #[error("failed to save configuration")]
    Save(#[source] confy::ConfyError),

    #[error("failed to resolve configuration path")]
    Path(#[source] confy::ConfyError),

    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}
