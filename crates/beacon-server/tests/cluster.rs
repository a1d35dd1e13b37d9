//! Two-node scenarios: replication, backup rejection, and failover.

mod common;

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use tempfile::tempdir;

use beacon_client::Client;
use beacon_config::{NodeConfig, PeerSpec};
use beacon_server::{Node, RunningNode};
use beacon_types::{Origin, PeerId, Role};

use common::{free_port, wait_for};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

struct Ports {
    biz: u16,
    hb: u16,
}

fn node_config(dir: &Path, db: &str, own: &Ports, peer_id: &str, peer: &Ports) -> NodeConfig {
    NodeConfig {
        self_address: format!("127.0.0.1:{}", own.biz),
        hb_address: format!("127.0.0.1:{}", own.hb),
        database: dir.join(db),
        peers: vec![PeerSpec {
            id: PeerId::new(peer_id),
            host: "127.0.0.1".to_string(),
            biz_port: peer.biz,
            hb_port: peer.hb,
        }],
        gc_interval_seconds: 0.1,
        elect_interval_seconds: 0.2,
        rpc_timeout_ms: 300,
        ..NodeConfig::default()
    }
}

/// Starts n1 first (older uptime, bootstrap primary), then n2 as its peer,
/// and waits until both agree n1 leads.
fn start_pair(dir: &Path, mutate: impl Fn(&mut NodeConfig)) -> (RunningNode, RunningNode) {
    let n1_ports = Ports {
        biz: free_port(),
        hb: free_port(),
    };
    let n2_ports = Ports {
        biz: free_port(),
        hb: free_port(),
    };

    let mut c1 = node_config(dir, "n1.db", &n1_ports, "n2", &n2_ports);
    c1.bootstrap_primary = true;
    mutate(&mut c1);
    let n1 = Node::start(c1).unwrap();

    // Give n1 a clear uptime head start before n2 boots.
    sleep(Duration::from_millis(300));

    let mut c2 = node_config(dir, "n2.db", &n2_ports, "n1", &n1_ports);
    mutate(&mut c2);
    let n2 = Node::start(c2).unwrap();

    wait_for("roles to settle", Duration::from_secs(5), || {
        n1.role() == Role::Primary && n2.role() == Role::Backup
    });
    (n1, n2)
}

#[test]
fn writes_replicate_to_the_backup() {
    let dir = tempdir().unwrap();
    let (n1, n2) = start_pair(dir.path(), |config| {
        // Short TTL so replica immunity is observable quickly.
        config.ttl_seconds = 0.5;
    });

    let mut primary = Client::connect(&n1.biz_addr().to_string(), CONNECT_TIMEOUT).unwrap();
    assert!(primary.register("svc-D", "1.2.3.4:80", "Python", "1.0", "EU").unwrap());

    // The echo arrives within one replication dispatch.
    let mut backup = Client::connect(&n2.biz_addr().to_string(), CONNECT_TIMEOUT).unwrap();
    wait_for("replication to reach the backup", Duration::from_secs(3), || {
        backup.get("svc-D").map(|a| a == "1.2.3.4:80").unwrap_or(false)
    });

    // The backup holds the record as a replica, immune to its own sweeper.
    let record = n2.store().get("svc-D").unwrap();
    assert_eq!(record.origin, Origin::Replica);
    sleep(Duration::from_millis(1200));
    assert_eq!(backup.get("svc-D").unwrap(), "1.2.3.4:80");

    n1.shutdown();
    n2.shutdown();
}

#[test]
fn backup_rejects_direct_writes() {
    let dir = tempdir().unwrap();
    let (n1, n2) = start_pair(dir.path(), |_| {});

    let mut backup = Client::connect(&n2.biz_addr().to_string(), CONNECT_TIMEOUT).unwrap();
    let err = backup
        .register("svc-E", "5.6.7.8:80", "Go", "1.0", "US")
        .unwrap_err();
    assert!(err.is_not_leader());
    assert!(backup.list().unwrap().iter().all(|o| o.name != "svc-E"));

    // The backup's liveness plane tells clients to go elsewhere.
    let mut hb = Client::connect(&n2.hb_addr().to_string(), CONNECT_TIMEOUT).unwrap();
    assert!(hb.ping().is_err());

    n1.shutdown();
    n2.shutdown();
}

#[test]
fn backup_takes_over_when_the_primary_dies() {
    let dir = tempdir().unwrap();
    let (n1, n2) = start_pair(dir.path(), |_| {});

    n1.shutdown();

    // With n1 unreachable, n2 ranks itself alone and takes over.
    wait_for("failover to n2", Duration::from_secs(5), || {
        n2.role() == Role::Primary
    });

    let mut client = Client::connect(&n2.biz_addr().to_string(), CONNECT_TIMEOUT).unwrap();
    assert!(client.register("svc-F", "9.9.9.9:90", "Rust", "1.0", "EU").unwrap());
    assert_eq!(client.get("svc-F").unwrap(), "9.9.9.9:90");

    // Fan-out to the dead peer is counted, not surfaced.
    wait_for("replication failure counter", Duration::from_secs(3), || {
        n2.peer_failures().iter().any(|(_, count)| *count >= 1)
    });

    n2.shutdown();
}
