//! Background maintenance loops: TTL sweeping and periodic snapshots.
//!
//! Both loops run on dedicated named threads and exit at their next
//! iteration boundary once the shared shutdown flag is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::store::Store;

// Granularity at which sleeping loops notice the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Spawns the TTL sweeper: every `interval`, evict expired local records.
pub fn spawn_sweeper(
    store: Arc<Store>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("beacon-gc".to_string())
        .spawn(move || {
            loop {
                if sleep_interruptible(&shutdown, interval) {
                    break;
                }
                let evicted = store.sweep_expired();
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "ttl sweep evicted records");
                }
            }
        })
        .expect("failed to spawn ttl sweeper thread")
}

/// Spawns the snapshot timer: every `interval`, rewrite the full durable
/// dump as a belt-and-braces complement to the per-mutation write-through.
pub fn spawn_snapshot_timer(
    store: Arc<Store>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("beacon-snapshot".to_string())
        .spawn(move || {
            loop {
                if sleep_interruptible(&shutdown, interval) {
                    break;
                }
                match store.save_snapshot() {
                    Ok(()) => debug!("periodic snapshot saved"),
                    Err(e) => error!(error = %e, "periodic snapshot failed, will retry"),
                }
            }
        })
        .expect("failed to spawn snapshot timer thread")
}

/// Sleeps for `duration`, waking early if the shutdown flag is set.
///
/// Returns `true` when shutdown was requested.
fn sleep_interruptible(shutdown: &AtomicBool, duration: Duration) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::SeqCst) {
            return true;
        }
        let step = remaining.min(SHUTDOWN_POLL);
        thread::sleep(step);
        remaining -= step;
    }
    shutdown.load(Ordering::SeqCst)
}
