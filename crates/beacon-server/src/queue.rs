//! Bounded hand-off queue between the acceptor and the worker pool.
//!
//! When the queue is full the acceptor gets the connection back and answers
//! busy-and-close, instead of accumulating unbounded accepted sockets while
//! all workers are occupied.

use std::net::TcpStream;

use crossbeam_queue::ArrayQueue;

/// Outcome of handing a freshly accepted connection to the worker pool.
#[derive(Debug)]
pub enum HandOff {
    /// A worker will pick the connection up.
    Accepted,
    /// Every slot is taken; the connection comes back to the acceptor.
    Busy(TcpStream),
}

/// Fixed-capacity queue of accepted connections awaiting a worker.
#[derive(Debug)]
pub struct ConnQueue {
    inner: ArrayQueue<TcpStream>,
}

impl ConnQueue {
    /// Creates a queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    /// Offers a connection to the pool.
    pub fn offer(&self, stream: TcpStream) -> HandOff {
        match self.inner.push(stream) {
            Ok(()) => HandOff::Accepted,
            Err(stream) => HandOff::Busy(stream),
        }
    }

    /// Takes the next waiting connection, if any.
    pub fn take(&self) -> Option<TcpStream> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair(listener: &TcpListener) -> TcpStream {
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let _ = listener.accept().unwrap();
        stream
    }

    #[test]
    fn full_queue_returns_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let queue = ConnQueue::new(1);

        assert!(matches!(
            queue.offer(loopback_pair(&listener)),
            HandOff::Accepted
        ));
        assert!(matches!(
            queue.offer(loopback_pair(&listener)),
            HandOff::Busy(_)
        ));

        assert!(queue.take().is_some());
        assert!(queue.take().is_none());
    }

    #[test]
    #[should_panic(expected = "queue capacity must be positive")]
    fn zero_capacity_panics() {
        let _ = ConnQueue::new(0);
    }
}
