//! Node assembly and lifecycle.
//!
//! Boot order follows the process lifecycle contract: load the snapshot,
//! start background loops, bind both planes, serve. Shutdown flips one
//! flag, joins every loop at its next iteration boundary, and flushes a
//! final snapshot.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{error, info};

use beacon_config::NodeConfig;
use beacon_store::{Store, spawn_snapshot_timer, spawn_sweeper};
use beacon_types::{NodeId, PeerId, Role, RoleCell};

use crate::context::NodeContext;
use crate::election::Elector;
use crate::error::ServerResult;
use crate::handler::BusinessHandler;
use crate::liveness::LivenessHandler;
use crate::replication::Replicator;
use crate::server::{PlaneConfig, PlaneServer, spawn_plane};

/// Entry point for assembling a registry node.
pub struct Node;

impl Node {
    /// Starts a node from its configuration and returns the running handle.
    pub fn start(config: NodeConfig) -> ServerResult<RunningNode> {
        config.validate()?;

        let ctx = Arc::new(NodeContext::new());
        let initial_role = if config.bootstrap_primary {
            Role::Primary
        } else {
            Role::Backup
        };
        let role = RoleCell::new(initial_role);
        info!(
            node_id = %ctx.node_id(),
            role = %initial_role,
            peers = config.peers.len(),
            "starting registry node"
        );

        let store = Arc::new(Store::open(&config.database, config.ttl())?);
        store.load_snapshot();

        let shutdown = Arc::new(AtomicBool::new(false));

        let replicator = Arc::new(Replicator::start(
            &config.peers,
            config.rpc_timeout(),
            config.accept_queue_capacity,
            Arc::clone(&shutdown),
        ));

        let business = spawn_plane(
            &config.self_address,
            &PlaneConfig {
                name: "business",
                workers: config.business_workers,
                queue_capacity: config.accept_queue_capacity,
                idle_timeout: config.idle_timeout(),
            },
            Arc::new(BusinessHandler::new(
                Arc::clone(&store),
                role.reader(),
                Arc::clone(&replicator),
            )),
            Arc::clone(&shutdown),
        )?;

        let liveness = spawn_plane(
            &config.hb_address,
            &PlaneConfig {
                name: "liveness",
                workers: config.liveness_workers,
                queue_capacity: config.accept_queue_capacity,
                idle_timeout: config.idle_timeout(),
            },
            Arc::new(LivenessHandler::new(role.reader(), Arc::clone(&ctx))),
            Arc::clone(&shutdown),
        )?;

        let mut loops = Vec::new();
        loops.push(spawn_sweeper(
            Arc::clone(&store),
            config.gc_interval(),
            Arc::clone(&shutdown),
        ));
        loops.push(spawn_snapshot_timer(
            Arc::clone(&store),
            config.snapshot_interval(),
            Arc::clone(&shutdown),
        ));
        loops.push(
            Elector::new(
                Arc::clone(&ctx),
                role.clone(),
                config.peers.clone(),
                config.elect_interval(),
                config.rpc_timeout(),
            )
            .spawn(Arc::clone(&shutdown)),
        );

        Ok(RunningNode {
            ctx,
            role,
            store,
            replicator,
            business,
            liveness,
            loops,
            shutdown,
        })
    }
}

/// A live registry node; dropping it without calling
/// [`RunningNode::shutdown`] leaks its worker threads.
pub struct RunningNode {
    ctx: Arc<NodeContext>,
    role: RoleCell,
    store: Arc<Store>,
    replicator: Arc<Replicator>,
    business: PlaneServer,
    liveness: PlaneServer,
    loops: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl RunningNode {
    pub fn node_id(&self) -> &NodeId {
        self.ctx.node_id()
    }

    /// Current role as derived by the election loop.
    pub fn role(&self) -> Role {
        self.role.get()
    }

    /// Bound business-plane address (resolves a configured port 0).
    pub fn biz_addr(&self) -> SocketAddr {
        self.business.local_addr()
    }

    /// Bound liveness-plane address.
    pub fn hb_addr(&self) -> SocketAddr {
        self.liveness.local_addr()
    }

    /// Handle to the object table, mainly for inspection.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Cumulative replication dispatch failures per peer.
    pub fn peer_failures(&self) -> Vec<(PeerId, u64)> {
        self.replicator.peer_failures()
    }

    /// Stops every loop, joins all threads, and flushes a final snapshot.
    pub fn shutdown(mut self) {
        info!(node_id = %self.ctx.node_id(), "shutting down registry node");
        self.shutdown.store(true, Ordering::SeqCst);

        self.business.join();
        self.liveness.join();
        self.replicator.join();
        for handle in self.loops.drain(..) {
            let _ = handle.join();
        }

        if let Err(e) = self.store.save_snapshot() {
            error!(error = %e, "final snapshot failed");
        }
        info!(node_id = %self.ctx.node_id(), "registry node stopped");
    }
}
