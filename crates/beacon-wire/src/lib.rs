//! # beacon-wire: Beacon's binary wire protocol
//!
//! Both RPC planes (business and liveness) speak the same framing: a small
//! fixed header followed by a postcard-encoded [`Request`] or [`Response`]
//! envelope. Frames are decoded incrementally out of a `BytesMut` read
//! buffer, so callers can feed partial socket reads and retry.
//!
//! The two planes exist for queue isolation, not for protocol divergence:
//! each server answers [`ErrorCode::InvalidRequest`] for the other plane's
//! operations.

mod error;
mod frame;
mod message;

pub use error::WireError;
pub use frame::{FRAME_HEADER_SIZE, FRAME_MAGIC, Frame, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use message::{
    DeregisterRequest, ErrorCode, ErrorResponse, GetRequest, GetResponse, HeartbeatAck,
    HeartbeatPing, ObjectInfo, ObjectListResponse, RegisterRequest, Request, RequestId,
    RequestPayload, Response, ResponsePayload, UptimeInfo,
};
