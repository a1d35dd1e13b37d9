//! Server error types.

use thiserror::Error;

use beacon_config::ConfigError;
use beacon_store::StoreError;
use beacon_wire::WireError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while assembling or running a registry node.
#[derive(Debug, Error)]
pub enum ServerError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire protocol error.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A plane listener could not be bound.
    #[error("failed to bind {plane} listener on {addr}: {source}")]
    BindFailed {
        plane: &'static str,
        addr: String,
        source: std::io::Error,
    },
}
