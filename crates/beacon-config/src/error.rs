//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or merging configuration sources failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The merged configuration is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
