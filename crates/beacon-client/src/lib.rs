//! # beacon-client: Blocking client for the Beacon registry
//!
//! One [`Client`] wraps one TCP connection to a single plane of a single
//! node. Calls are strictly request/response over the shared wire framing;
//! every call honors the connect/read/write timeout given at construction.
//!
//! The same client type serves three audiences: external service processes
//! (register/heartbeat/lookup), the replicator (peer write fan-out on the
//! business plane), and the elector (uptime probes on the liveness plane).

mod error;

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use tracing::trace;

use beacon_wire::{
    DeregisterRequest, Frame, GetRequest, HeartbeatPing, ObjectInfo, RegisterRequest, Request,
    RequestId, RequestPayload, Response, ResponsePayload, UptimeInfo,
};

pub use error::{ClientError, ClientResult};

/// A blocking connection to one RPC plane of one registry node.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
    read_buf: BytesMut,
    next_id: u64,
}

impl Client {
    /// Connects to `addr`, applying `timeout` to the connection attempt and
    /// to every subsequent read and write.
    pub fn connect(addr: &str, timeout: Duration) -> ClientResult<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    trace!(%candidate, "connected");
                    return Ok(Self {
                        stream,
                        read_buf: BytesMut::with_capacity(4096),
                        next_id: 1,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                std::io::Error::new(ErrorKind::InvalidInput, "address resolved to nothing")
            })
            .into())
    }

    /// Sends one request and waits for its response.
    ///
    /// Server-side rejections surface as [`ClientError::Rejected`].
    pub fn call(&mut self, payload: RequestPayload) -> ClientResult<ResponsePayload> {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        let mut out = BytesMut::new();
        Request::new(id, payload).to_frame()?.encode(&mut out);
        self.stream.write_all(&out)?;

        let response = self.read_response()?;
        if response.id != id {
            return Err(ClientError::UnexpectedResponse);
        }
        match response.payload {
            ResponsePayload::Error(e) => Err(ClientError::Rejected {
                code: e.code,
                message: e.message,
            }),
            payload => Ok(payload),
        }
    }

    fn read_response(&mut self) -> ClientResult<Response> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf)? {
                return Ok(Response::from_frame(&frame)?);
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ClientError::ConnectionClosed),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(ClientError::Timeout);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ------------------------------------------------------------------
    // Business plane
    // ------------------------------------------------------------------

    /// Registers a service object. Returns the server's success flag.
    pub fn register(
        &mut self,
        name: &str,
        address: &str,
        language: &str,
        version: &str,
        region: &str,
    ) -> ClientResult<bool> {
        let payload = RequestPayload::Register(RegisterRequest {
            name: name.to_string(),
            address: address.to_string(),
            language: language.to_string(),
            version: version.to_string(),
            region: region.to_string(),
            is_replication: false,
        });
        self.expect_ack(payload)
    }

    /// Updates an existing registration; fails (`Ok(false)`) on an unknown
    /// name.
    pub fn update(
        &mut self,
        name: &str,
        address: &str,
        language: &str,
        version: &str,
        region: &str,
    ) -> ClientResult<bool> {
        let payload = RequestPayload::Update(RegisterRequest {
            name: name.to_string(),
            address: address.to_string(),
            language: language.to_string(),
            version: version.to_string(),
            region: region.to_string(),
            is_replication: false,
        });
        self.expect_ack(payload)
    }

    /// Removes a registration. Returns `false` if the name was absent.
    pub fn deregister(&mut self, name: &str) -> ClientResult<bool> {
        let payload = RequestPayload::Deregister(DeregisterRequest {
            name: name.to_string(),
            is_replication: false,
        });
        self.expect_ack(payload)
    }

    /// Looks up an object's address; an empty string means absent.
    pub fn get(&mut self, name: &str) -> ClientResult<String> {
        match self.call(RequestPayload::Get(GetRequest {
            name: name.to_string(),
        }))? {
            ResponsePayload::Get(resp) => Ok(resp.address),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Lists all current registrations, order unspecified.
    pub fn list(&mut self) -> ClientResult<Vec<ObjectInfo>> {
        match self.call(RequestPayload::List)? {
            ResponsePayload::List(resp) => Ok(resp.objects),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Sends a liveness heartbeat for a registered object.
    ///
    /// `Ok(false)` means the registry does not know the name and the caller
    /// should re-register.
    pub fn heartbeat(&mut self, name: &str) -> ClientResult<bool> {
        match self.call(RequestPayload::Heartbeat(HeartbeatPing {
            name: name.to_string(),
        }))? {
            ResponsePayload::Heartbeat(ack) => Ok(ack.ok),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    // ------------------------------------------------------------------
    // Liveness plane
    // ------------------------------------------------------------------

    /// Probes node availability; a backup rejects with `Unavailable`.
    pub fn ping(&mut self) -> ClientResult<()> {
        match self.call(RequestPayload::Ping)? {
            ResponsePayload::Pong => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches the node's identity and uptime, regardless of role.
    pub fn get_uptime(&mut self) -> ClientResult<UptimeInfo> {
        match self.call(RequestPayload::GetUptime)? {
            ResponsePayload::Uptime(info) => Ok(info),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    fn expect_ack(&mut self, payload: RequestPayload) -> ClientResult<bool> {
        match self.call(payload)? {
            ResponsePayload::Ack { success } => Ok(success),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    use beacon_types::NodeId;
    use beacon_wire::ErrorCode;

    /// Serves exactly `n` canned responses on an ephemeral port.
    fn fake_node(
        responses: Vec<fn(Request) -> Response>,
    ) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = BytesMut::new();
            let mut chunk = [0u8; 4096];
            for respond in responses {
                let request = loop {
                    if let Some(frame) = Frame::decode(&mut buf).unwrap() {
                        break Request::from_frame(&frame).unwrap();
                    }
                    let n = stream.read(&mut chunk).unwrap();
                    assert!(n > 0, "client hung up early");
                    buf.extend_from_slice(&chunk[..n]);
                };
                let mut out = BytesMut::new();
                respond(request).to_frame().unwrap().encode(&mut out);
                stream.write_all(&out).unwrap();
            }
        });
        (addr, handle)
    }

    #[test]
    fn uptime_call_round_trips() {
        let (addr, server) = fake_node(vec![|req| {
            assert_eq!(req.payload, RequestPayload::GetUptime);
            Response::new(
                req.id,
                ResponsePayload::Uptime(UptimeInfo {
                    node_id: NodeId::new("abc12345"),
                    uptime_sec: 42.5,
                }),
            )
        }]);

        let mut client = Client::connect(&addr, Duration::from_secs(1)).unwrap();
        let info = client.get_uptime().unwrap();
        assert_eq!(info.node_id.as_str(), "abc12345");
        assert!((info.uptime_sec - 42.5).abs() < f64::EPSILON);
        server.join().unwrap();
    }

    #[test]
    fn rejection_surfaces_code_and_message() {
        let (addr, server) = fake_node(vec![|req| {
            Response::error(req.id, ErrorCode::NotLeader, "not the leader")
        }]);

        let mut client = Client::connect(&addr, Duration::from_secs(1)).unwrap();
        let err = client
            .register("svc", "1.2.3.4:80", "Go", "1.0", "EU")
            .unwrap_err();
        assert!(err.is_not_leader());
        server.join().unwrap();
    }

    #[test]
    fn connect_to_dead_port_fails() {
        // Bind then drop to find a port nothing is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(Client::connect(&addr, Duration::from_millis(200)).is_err());
    }
}
