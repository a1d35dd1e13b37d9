//! Uptime-ranked leader election.
//!
//! Every election interval, each node independently ranks itself and every
//! reachable peer by uptime and adopts `Primary` iff it comes first. The
//! longest-uptime rule is a stability heuristic: a freshly restarted node
//! cannot steal leadership from a long-running one, which damps flapping
//! around partial outages. This is not consensus; during a partition both
//! sides may believe they are primary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use beacon_client::Client;
use beacon_config::PeerSpec;
use beacon_types::{NodeId, Role, RoleCell};

use crate::context::NodeContext;

// Granularity at which the election loop notices the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// One election candidate: a node id and its reported uptime.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: NodeId,
    pub uptime_sec: f64,
}

/// Picks the presumed leader: highest uptime wins, ties broken by
/// lexicographically smallest node id so equal-uptime nodes cannot
/// oscillate.
pub fn presumed_leader(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.sort_by(|a, b| {
        b.uptime_sec
            .partial_cmp(&a.uptime_sec)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.into_iter().next()
}

/// Periodically derives this node's role from observed peer uptimes.
pub struct Elector {
    ctx: Arc<NodeContext>,
    role: RoleCell,
    peers: Vec<PeerSpec>,
    interval: Duration,
    rpc_timeout: Duration,
}

impl Elector {
    pub fn new(
        ctx: Arc<NodeContext>,
        role: RoleCell,
        peers: Vec<PeerSpec>,
        interval: Duration,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            role,
            peers,
            interval,
            rpc_timeout,
        }
    }

    /// Runs the election loop on its own thread until shutdown.
    ///
    /// The first round runs immediately so a freshly booted node settles
    /// its role without waiting a full interval.
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("beacon-elector".to_string())
            .spawn(move || {
                loop {
                    self.round();
                    if sleep_interruptible(&shutdown, self.interval) {
                        break;
                    }
                }
            })
            .expect("failed to spawn elector thread")
    }

    /// Executes one election round and updates the role cell.
    pub fn round(&self) {
        let mut candidates = vec![Candidate {
            id: self.ctx.node_id().clone(),
            uptime_sec: self.ctx.uptime_secs(),
        }];

        for peer in &self.peers {
            match self.probe(peer) {
                Some(candidate) => candidates.push(candidate),
                // Unreachable peers silently drop out of this round.
                None => debug!(peer = %peer.id, "peer unreachable during election round"),
            }
        }

        let leader = presumed_leader(candidates).expect("candidate list contains self");
        let new_role = if &leader.id == self.ctx.node_id() {
            Role::Primary
        } else {
            Role::Backup
        };

        let previous = self.role.get();
        if previous != new_role {
            info!(
                node_id = %self.ctx.node_id(),
                previous = %previous,
                role = %new_role,
                leader = %leader.id,
                "role transition"
            );
        }
        self.role.set(new_role);
    }

    fn probe(&self, peer: &PeerSpec) -> Option<Candidate> {
        let mut client = Client::connect(&peer.hb_addr(), self.rpc_timeout).ok()?;
        let info = client.get_uptime().ok()?;
        Some(Candidate {
            id: info.node_id,
            uptime_sec: info.uptime_sec,
        })
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, uptime_sec: f64) -> Candidate {
        Candidate {
            id: NodeId::new(id),
            uptime_sec,
        }
    }

    #[test]
    fn highest_uptime_wins() {
        let leader = presumed_leader(vec![
            candidate("young", 5.0),
            candidate("old", 500.0),
            candidate("middle", 50.0),
        ])
        .unwrap();
        assert_eq!(leader.id.as_str(), "old");
    }

    #[test]
    fn ties_break_on_smallest_id() {
        let leader = presumed_leader(vec![
            candidate("bbb", 100.0),
            candidate("aaa", 100.0),
            candidate("ccc", 100.0),
        ])
        .unwrap();
        assert_eq!(leader.id.as_str(), "aaa");

        // Input order must not matter.
        let leader = presumed_leader(vec![
            candidate("ccc", 100.0),
            candidate("aaa", 100.0),
            candidate("bbb", 100.0),
        ])
        .unwrap();
        assert_eq!(leader.id.as_str(), "aaa");
    }

    #[test]
    fn sole_candidate_leads() {
        let leader = presumed_leader(vec![candidate("only", 1.0)]).unwrap();
        assert_eq!(leader.id.as_str(), "only");
        assert!(presumed_leader(Vec::new()).is_none());
    }

    #[test]
    fn round_without_peers_elects_self() {
        let ctx = Arc::new(NodeContext::new());
        let role = RoleCell::new(Role::Backup);
        let elector = Elector::new(
            Arc::clone(&ctx),
            role.clone(),
            Vec::new(),
            Duration::from_secs(2),
            Duration::from_millis(100),
        );

        elector.round();
        assert_eq!(role.get(), Role::Primary);
    }
}
