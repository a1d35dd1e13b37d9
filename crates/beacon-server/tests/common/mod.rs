//! Shared helpers for node integration tests.
#![allow(dead_code)] // not every test binary uses every helper

use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};

use beacon_config::NodeConfig;

/// Reserves an ephemeral port by binding and immediately releasing it.
///
/// There is a small window in which another process could grab the port,
/// which is acceptable for tests.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// A single-node configuration on ephemeral ports with snappy intervals.
pub fn single_node_config(dir: &Path) -> NodeConfig {
    NodeConfig {
        self_address: "127.0.0.1:0".to_string(),
        hb_address: "127.0.0.1:0".to_string(),
        database: dir.join("registry.db"),
        bootstrap_primary: true,
        gc_interval_seconds: 0.1,
        elect_interval_seconds: 0.2,
        rpc_timeout_ms: 300,
        ..NodeConfig::default()
    }
}

/// Polls `check` until it returns true or the deadline passes.
pub fn wait_for(what: &str, timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out after {timeout:?} waiting for {what}"
        );
        std::thread::sleep(Duration::from_millis(25));
    }
}
