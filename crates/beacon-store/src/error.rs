//! Store error types.

use thiserror::Error;

/// Errors from the durable row log.
///
/// Durable failures during a mutation are logged by the [`crate::Store`]
/// and never propagated to clients: the in-memory state stays authoritative
/// and the next snapshot retries the full dump.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error against the row log file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Row (de)serialization failed.
    #[error("row codec error: {0}")]
    Codec(#[from] postcard::Error),
}
