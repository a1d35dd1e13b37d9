//! Client error types.

use thiserror::Error;

use beacon_wire::{ErrorCode, WireError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to a registry node.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame or message (de)serialization failure.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// The per-call deadline elapsed before a full response arrived.
    #[error("call timed out")]
    Timeout,

    /// The server closed the connection mid-call.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The server answered with an error response.
    #[error("rejected by server ({code}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// The server answered with an unexpected payload variant or id.
    #[error("unexpected response from server")]
    UnexpectedResponse,
}

impl ClientError {
    /// True if the server rejected the call because it is not the primary.
    pub fn is_not_leader(&self) -> bool {
        matches!(
            self,
            ClientError::Rejected {
                code: ErrorCode::NotLeader,
                ..
            }
        )
    }
}
