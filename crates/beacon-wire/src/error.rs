//! Wire protocol error types.

use thiserror::Error;

use crate::frame::MAX_FRAME_SIZE;

/// Errors that can occur while encoding or decoding frames and messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame header did not start with the expected magic bytes.
    #[error("bad frame magic")]
    BadMagic,

    /// The peer speaks an unknown protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The advertised payload length exceeds the frame size limit.
    #[error("frame of {0} bytes exceeds maximum of {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Payload (de)serialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),
}
