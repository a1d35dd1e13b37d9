//! # beacon-server: The Beacon registry node runtime
//!
//! Assembles one registry node out of four cooperating components:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       beacon-server                         │
//! │  ┌───────────────┐  ┌───────────────┐  ┌────────────────┐  │
//! │  │ business plane│→ │ BusinessHandler│→ │ Store          │  │
//! │  │ (pool of 10)  │  │ role-gated     │  │ + Replicator → │──┼─► peers
//! │  ├───────────────┤  ├───────────────┤  └────────────────┘  │
//! │  │ liveness plane│→ │ LivenessHandler│     ▲ role cell      │
//! │  │ (pool of 4)   │  │ ping / uptime  │     │                │
//! │  └───────────────┘  └───────────────┘  ┌────────────────┐  │
//! │                                        │ Elector (loop) │  │
//! │                                        └────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The RPC surface is the sole entry point. Writes reach the store through
//! the role gate and fan out through the replicator; the elector only ever
//! mutates the node's role flag; the TTL sweeper lives with the store.
//!
//! No async runtime: plain threads, bounded queues, and blocking sockets
//! with short poll timeouts so every loop notices the shutdown flag at an
//! iteration boundary.

mod context;
mod election;
mod error;
mod handler;
mod liveness;
mod node;
mod queue;
mod replication;
mod server;

pub use context::NodeContext;
pub use election::{Candidate, Elector, presumed_leader};
pub use error::{ServerError, ServerResult};
pub use node::{Node, RunningNode};
pub use replication::{Replicator, WriteOp};
