//! Request and response envelopes for both RPC planes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use beacon_types::{NodeId, Timestamp};

use crate::error::WireError;
use crate::frame::Frame;

/// Correlates a response with the request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const ZERO: RequestId = RequestId(0);
}

/// Registration payload, shared by `Register` and `Update`.
///
/// `is_replication` is set only by the primary when forwarding the write to
/// its peers; clients never set it, and a receiving node never re-sets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub address: String,
    pub language: String,
    pub version: String,
    pub region: String,
    pub is_replication: bool,
}

/// Removes a registration by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregisterRequest {
    pub name: String,
    pub is_replication: bool,
}

/// Looks up a single registration by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub name: String,
}

/// Address lookup result; an empty address means the name is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub address: String,
}

/// Liveness signal for a registered object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPing {
    pub name: String,
}

/// Heartbeat outcome; `ok = false` means the name is unknown and the client
/// should re-register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub ok: bool,
}

/// One entry of a `List` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub address: String,
    pub language: String,
    pub version: String,
    pub region: String,
    pub last_seen: Timestamp,
}

/// Full table dump, order unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectListResponse {
    pub objects: Vec<ObjectInfo>,
}

/// Identity and uptime reported on the liveness plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeInfo {
    pub node_id: NodeId,
    pub uptime_sec: f64,
}

/// Semantic rejection categories surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A direct write landed on a backup; retry against another node.
    NotLeader,
    /// Backup answering a liveness ping; try another node.
    Unavailable,
    /// Malformed request, or an operation sent to the wrong plane.
    InvalidRequest,
    /// The accept queue is full; retry later.
    Busy,
    /// Unclassified server-side failure.
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::NotLeader => "not-leader",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::InvalidRequest => "invalid-request",
            ErrorCode::Busy => "busy",
            ErrorCode::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Error detail attached to a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

/// Operations understood by the registry, across both planes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    // Business plane
    Register(RegisterRequest),
    Update(RegisterRequest),
    Deregister(DeregisterRequest),
    Get(GetRequest),
    List,
    Heartbeat(HeartbeatPing),

    // Liveness plane
    Ping,
    GetUptime,
}

impl RequestPayload {
    /// Returns true for operations served by the liveness plane.
    pub fn is_liveness(&self) -> bool {
        matches!(self, RequestPayload::Ping | RequestPayload::GetUptime)
    }

    /// Short operation name for logging.
    pub fn op_name(&self) -> &'static str {
        match self {
            RequestPayload::Register(_) => "register",
            RequestPayload::Update(_) => "update",
            RequestPayload::Deregister(_) => "deregister",
            RequestPayload::Get(_) => "get",
            RequestPayload::List => "list",
            RequestPayload::Heartbeat(_) => "heartbeat",
            RequestPayload::Ping => "ping",
            RequestPayload::GetUptime => "get-uptime",
        }
    }
}

/// A framed request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub payload: RequestPayload,
}

impl Request {
    pub fn new(id: RequestId, payload: RequestPayload) -> Self {
        Self { id, payload }
    }

    /// Serializes the request into a frame.
    pub fn to_frame(&self) -> Result<Frame, WireError> {
        let bytes = postcard::to_allocvec(self)?;
        Frame::new(Bytes::from(bytes))
    }

    /// Deserializes a request from a frame payload.
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        Ok(postcard::from_bytes(frame.payload())?)
    }
}

/// Results returned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Register / Update / Deregister outcome.
    Ack { success: bool },
    Get(GetResponse),
    List(ObjectListResponse),
    Heartbeat(HeartbeatAck),
    Pong,
    Uptime(UptimeInfo),
    Error(ErrorResponse),
}

/// A framed response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: RequestId,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn new(id: RequestId, payload: ResponsePayload) -> Self {
        Self { id, payload }
    }

    /// Builds an error response with the given code and message.
    pub fn error(id: RequestId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        }
    }

    /// Serializes the response into a frame.
    pub fn to_frame(&self) -> Result<Frame, WireError> {
        let bytes = postcard::to_allocvec(self)?;
        Frame::new(Bytes::from(bytes))
    }

    /// Deserializes a response from a frame payload.
    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        Ok(postcard::from_bytes(frame.payload())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn register_request_survives_framing() {
        let req = Request::new(
            RequestId(7),
            RequestPayload::Register(RegisterRequest {
                name: "svc-a".into(),
                address: "10.0.0.1:6000".into(),
                language: "Python".into(),
                version: "1.0".into(),
                region: "EU".into(),
                is_replication: false,
            }),
        );

        let mut buf = BytesMut::new();
        req.to_frame().unwrap().encode(&mut buf);
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        let decoded = Request::from_frame(&frame).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn error_response_carries_code_and_message() {
        let resp = Response::error(RequestId(3), ErrorCode::NotLeader, "not the leader");
        match &resp.payload {
            ResponsePayload::Error(e) => {
                assert_eq!(e.code, ErrorCode::NotLeader);
                assert_eq!(e.message, "not the leader");
            }
            other => panic!("expected error payload, got {other:?}"),
        }

        let frame = resp.to_frame().unwrap();
        let decoded = Response::from_frame(&frame).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn plane_classification() {
        assert!(RequestPayload::Ping.is_liveness());
        assert!(RequestPayload::GetUptime.is_liveness());
        assert!(!RequestPayload::List.is_liveness());
        assert_eq!(
            RequestPayload::Heartbeat(HeartbeatPing { name: "x".into() }).op_name(),
            "heartbeat"
        );
    }
}
