//! Write fan-out from the primary to its peers.
//!
//! The RPC surface applies a write locally first, then hands it to the
//! [`Replicator`], which enqueues a copy (with `is_replication = true`) for
//! every peer. One outbound worker per peer drains its FIFO inbox over a
//! cached connection, so writes to a single peer go out in the order they
//! were accepted locally; no ordering is imposed across peers.
//!
//! Dispatch is fire-and-forget: a peer failure is logged and counted in an
//! observable per-peer counter, never surfaced to the client. A backup that
//! misses echoes stays out of sync until clients re-issue writes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use tracing::{debug, warn};

use beacon_client::Client;
use beacon_config::PeerSpec;
use beacon_types::PeerId;
use beacon_wire::{DeregisterRequest, RegisterRequest, RequestPayload, ResponsePayload};

// How often an idle outbound worker re-checks its inbox and the shutdown flag.
const INBOX_POLL: Duration = Duration::from_millis(10);

/// A write accepted by the primary, queued for peer fan-out.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Register(RegisterRequest),
    Update(RegisterRequest),
    Deregister(DeregisterRequest),
}

impl WriteOp {
    fn op_name(&self) -> &'static str {
        match self {
            WriteOp::Register(_) => "register",
            WriteOp::Update(_) => "update",
            WriteOp::Deregister(_) => "deregister",
        }
    }

    fn object_name(&self) -> &str {
        match self {
            WriteOp::Register(r) | WriteOp::Update(r) => &r.name,
            WriteOp::Deregister(d) => &d.name,
        }
    }

    /// Converts into the outbound payload, marking it as a replication echo.
    fn into_request_payload(self) -> RequestPayload {
        match self {
            WriteOp::Register(mut r) => {
                r.is_replication = true;
                RequestPayload::Register(r)
            }
            WriteOp::Update(mut r) => {
                r.is_replication = true;
                RequestPayload::Update(r)
            }
            WriteOp::Deregister(mut d) => {
                d.is_replication = true;
                RequestPayload::Deregister(d)
            }
        }
    }
}

struct PeerHandle {
    id: PeerId,
    inbox: Arc<ArrayQueue<WriteOp>>,
    failures: Arc<AtomicU64>,
}

/// Fans accepted writes out to every configured peer.
pub struct Replicator {
    peers: Vec<PeerHandle>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Replicator {
    /// Spawns one outbound worker per peer.
    pub fn start(
        peers: &[PeerSpec],
        rpc_timeout: Duration,
        inbox_capacity: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let mut handles = Vec::with_capacity(peers.len());
        let mut workers = Vec::with_capacity(peers.len());

        for spec in peers {
            let inbox = Arc::new(ArrayQueue::new(inbox_capacity.max(1)));
            let failures = Arc::new(AtomicU64::new(0));

            let worker = {
                let spec = spec.clone();
                let inbox = Arc::clone(&inbox);
                let failures = Arc::clone(&failures);
                let shutdown = Arc::clone(&shutdown);
                thread::Builder::new()
                    .name(format!("beacon-repl-{}", spec.id))
                    .spawn(move || peer_loop(&spec, &inbox, &failures, rpc_timeout, &shutdown))
                    .expect("failed to spawn replication worker thread")
            };

            handles.push(PeerHandle {
                id: spec.id.clone(),
                inbox,
                failures,
            });
            workers.push(worker);
        }

        Self {
            peers: handles,
            workers: Mutex::new(workers),
        }
    }

    /// Queues a copy of the write for every peer.
    ///
    /// A full inbox counts as a peer failure: the op is dropped for that
    /// peer and the client request is unaffected.
    pub fn replicate(&self, op: &WriteOp) {
        for peer in &self.peers {
            if peer.inbox.push(op.clone()).is_err() {
                peer.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer = %peer.id,
                    op = op.op_name(),
                    name = op.object_name(),
                    "replication inbox full, dropping op for peer"
                );
            }
        }
    }

    /// Cumulative dispatch failures per peer since boot.
    pub fn peer_failures(&self) -> Vec<(PeerId, u64)> {
        self.peers
            .iter()
            .map(|p| (p.id.clone(), p.failures.load(Ordering::Relaxed)))
            .collect()
    }

    /// Joins all outbound workers. Call after setting the shutdown flag.
    pub fn join(&self) {
        let mut workers = self.workers.lock().expect("replicator worker list poisoned");
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn peer_loop(
    spec: &PeerSpec,
    inbox: &ArrayQueue<WriteOp>,
    failures: &AtomicU64,
    rpc_timeout: Duration,
    shutdown: &AtomicBool,
) {
    let mut conn: Option<Client> = None;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match inbox.pop() {
            Some(op) => {
                if !dispatch(&mut conn, spec, op, rpc_timeout) {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => thread::sleep(INBOX_POLL),
        }
    }
}

/// Sends one op to a peer, reconnecting if needed. Returns success.
fn dispatch(conn: &mut Option<Client>, spec: &PeerSpec, op: WriteOp, rpc_timeout: Duration) -> bool {
    let op_name = op.op_name();
    let object = op.object_name().to_string();

    let client = match conn {
        Some(client) => client,
        None => match Client::connect(&spec.biz_addr(), rpc_timeout) {
            Ok(client) => conn.insert(client),
            Err(e) => {
                warn!(peer = %spec.id, error = %e, op = op_name, name = %object,
                      "peer unreachable, dropping replication op");
                return false;
            }
        },
    };

    match client.call(op.into_request_payload()) {
        Ok(ResponsePayload::Ack { success }) => {
            debug!(peer = %spec.id, op = op_name, name = %object, success,
                   "replicated op to peer");
            true
        }
        Ok(_) => {
            warn!(peer = %spec.id, op = op_name, name = %object,
                  "unexpected replication response, dropping connection");
            *conn = None;
            false
        }
        Err(e) => {
            warn!(peer = %spec.id, error = %e, op = op_name, name = %object,
                  "replication dispatch failed");
            *conn = None;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_op(name: &str) -> WriteOp {
        WriteOp::Register(RegisterRequest {
            name: name.into(),
            address: "1.2.3.4:80".into(),
            language: "Go".into(),
            version: "1.0".into(),
            region: "EU".into(),
            is_replication: false,
        })
    }

    #[test]
    fn outbound_payload_is_marked_as_replication() {
        match register_op("svc").into_request_payload() {
            RequestPayload::Register(r) => assert!(r.is_replication),
            other => panic!("expected register payload, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_peer_counts_as_failure() {
        // Bind then drop to find a dead port.
        let dead_addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let spec = PeerSpec {
            id: PeerId::new("n2"),
            host: "127.0.0.1".to_string(),
            biz_port: dead_addr.port(),
            hb_port: dead_addr.port(),
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let replicator =
            Replicator::start(&[spec], Duration::from_millis(100), 16, Arc::clone(&shutdown));
        replicator.replicate(&register_op("svc"));

        // Give the worker time to attempt the dispatch.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let failures = replicator.peer_failures();
            if failures[0].1 >= 1 {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "no failure recorded");
            thread::sleep(Duration::from_millis(20));
        }

        shutdown.store(true, Ordering::SeqCst);
        replicator.join();
    }

    #[test]
    fn no_peers_means_no_counters() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let replicator = Replicator::start(&[], Duration::from_millis(100), 16, shutdown);
        replicator.replicate(&register_op("svc"));
        assert!(replicator.peer_failures().is_empty());
        replicator.join();
    }
}
