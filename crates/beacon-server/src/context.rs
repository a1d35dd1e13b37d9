//! Per-process node identity.

use std::time::Instant;

use beacon_types::NodeId;

/// Identity and boot time of this node.
///
/// Created once in [`crate::Node::start`] and threaded into every component
/// that needs identity or uptime; there is no module-level state.
#[derive(Debug)]
pub struct NodeContext {
    node_id: NodeId,
    started: Instant,
}

impl NodeContext {
    /// Captures a fresh identity and the boot instant.
    pub fn new() -> Self {
        Self {
            node_id: NodeId::generate(),
            started: Instant::now(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Seconds this process has been alive.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Default for NodeContext {
    fn default() -> Self {
        Self::new()
    }
}
