//! One RPC plane: a listener, a bounded hand-off queue, and a fixed pool of
//! worker threads serving blocking connection loops.
//!
//! There is no event loop; a worker owns one connection at a time and may
//! block on the store mutex or (via the handler) on nothing longer than a
//! single request. Reads use a short poll timeout so workers notice the
//! shutdown flag and the idle deadline between requests.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, error, info, trace, warn};

use beacon_wire::{ErrorCode, Frame, Request, RequestId, Response};

use crate::error::{ServerError, ServerResult};
use crate::queue::{ConnQueue, HandOff};

// How often the acceptor re-polls a quiet listener.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

// How often an idle worker re-checks the hand-off queue.
const WORKER_POLL: Duration = Duration::from_millis(5);

// Read poll granularity inside a connection; bounds shutdown latency.
const READ_POLL: Duration = Duration::from_millis(250);

// Cap on a blocking response write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes one decoded request to a response.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

/// Sizing knobs for one plane.
pub struct PlaneConfig {
    /// Plane name used in logs and thread names.
    pub name: &'static str,
    /// Worker pool size.
    pub workers: usize,
    /// Accepted-connection queue capacity.
    pub queue_capacity: usize,
    /// Idle time after which a connection is closed.
    pub idle_timeout: Duration,
}

/// A running plane: acceptor thread plus worker pool.
pub struct PlaneServer {
    name: &'static str,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl PlaneServer {
    /// Address the plane actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Joins the acceptor and every worker. Call after setting the
    /// shutdown flag.
    pub fn join(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!(plane = self.name, "plane stopped");
    }
}

/// Binds `addr` and spawns the acceptor and worker threads for one plane.
pub fn spawn_plane(
    addr: &str,
    config: &PlaneConfig,
    handler: Arc<dyn RequestHandler>,
    shutdown: Arc<AtomicBool>,
) -> ServerResult<PlaneServer> {
    let listener = TcpListener::bind(addr).map_err(|source| ServerError::BindFailed {
        plane: config.name,
        addr: addr.to_string(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    info!(plane = config.name, addr = %local_addr, "listening");

    let queue = Arc::new(ConnQueue::new(config.queue_capacity));

    let acceptor = {
        let name = config.name;
        let queue = Arc::clone(&queue);
        let shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name(format!("beacon-accept-{name}"))
            .spawn(move || accept_loop(name, &listener, &queue, &shutdown))
            .expect("failed to spawn acceptor thread")
    };

    let mut workers = Vec::with_capacity(config.workers);
    for i in 0..config.workers {
        let name = config.name;
        let queue = Arc::clone(&queue);
        let handler = Arc::clone(&handler);
        let shutdown = Arc::clone(&shutdown);
        let idle_timeout = config.idle_timeout;
        let worker = thread::Builder::new()
            .name(format!("beacon-{name}-{i}"))
            .spawn(move || worker_loop(&queue, &*handler, idle_timeout, &shutdown))
            .expect("failed to spawn worker thread");
        workers.push(worker);
    }

    Ok(PlaneServer {
        name: config.name,
        local_addr,
        acceptor: Some(acceptor),
        workers,
    })
}

fn accept_loop(
    plane: &'static str,
    listener: &TcpListener,
    queue: &ConnQueue,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                trace!(plane, %peer, "accepted connection");
                match queue.offer(stream) {
                    HandOff::Accepted => {}
                    HandOff::Busy(stream) => {
                        warn!(plane, %peer, "accept queue full, rejecting connection");
                        reject_busy(stream);
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!(plane, error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Tells an over-capacity client to come back later, best-effort.
fn reject_busy(mut stream: TcpStream) {
    let response = Response::error(RequestId::ZERO, ErrorCode::Busy, "accept queue full");
    let Ok(frame) = response.to_frame() else {
        return;
    };
    let mut buf = BytesMut::new();
    frame.encode(&mut buf);
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
    let _ = stream.write_all(&buf);
}

fn worker_loop(
    queue: &ConnQueue,
    handler: &dyn RequestHandler,
    idle_timeout: Duration,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match queue.take() {
            Some(stream) => {
                if let Err(e) = serve_connection(stream, handler, idle_timeout, shutdown) {
                    debug!(error = %e, "connection ended with error");
                }
            }
            None => thread::sleep(WORKER_POLL),
        }
    }
}

/// Serves one connection's request/response loop until the peer hangs up,
/// the idle deadline passes, or shutdown is requested.
fn serve_connection(
    mut stream: TcpStream,
    handler: &dyn RequestHandler,
    idle_timeout: Duration,
    shutdown: &AtomicBool,
) -> ServerResult<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let mut idle = Duration::ZERO;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(());
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                idle = Duration::ZERO;
                buf.extend_from_slice(&chunk[..n]);
                loop {
                    match Frame::decode(&mut buf) {
                        Ok(Some(frame)) => match Request::from_frame(&frame) {
                            Ok(request) => {
                                trace!(op = request.payload.op_name(), "handling request");
                                let response = handler.handle(request);
                                write_response(&mut stream, &response)?;
                            }
                            Err(e) => {
                                warn!(error = %e, "undecodable request, closing connection");
                                let response = Response::error(
                                    RequestId::ZERO,
                                    ErrorCode::InvalidRequest,
                                    e.to_string(),
                                );
                                let _ = write_response(&mut stream, &response);
                                return Ok(());
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "framing error, closing connection");
                            let response = Response::error(
                                RequestId::ZERO,
                                ErrorCode::InvalidRequest,
                                e.to_string(),
                            );
                            let _ = write_response(&mut stream, &response);
                            return Ok(());
                        }
                    }
                }
            }
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                idle += READ_POLL;
                if idle >= idle_timeout {
                    debug!("connection idle, closing");
                    return Ok(());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn write_response(stream: &mut TcpStream, response: &Response) -> ServerResult<()> {
    let mut buf = BytesMut::new();
    response.to_frame()?.encode(&mut buf);
    stream.write_all(&buf)?;
    Ok(())
}
