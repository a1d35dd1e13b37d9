//! # beacon-store: The registry object table
//!
//! Owns the authoritative in-memory map `name -> ObjectRecord`, persists
//! every mutation to an append-only row log, and evicts stale locally-owned
//! records after their TTL.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                    Store                      │
//! │  ┌──────────────────┐   ┌─────────────────┐  │
//! │  │ HashMap<name,rec>│ → │ RowLog (1 file) │  │
//! │  │  (single mutex)  │   │ append + rewrite│  │
//! │  └──────────────────┘   └─────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All operations are serialized by one mutex held for the duration of each
//! call, including the durable write-through. Reads copy out before
//! returning; callers never retain references into the map.

mod error;
mod rowlog;
mod store;
mod sweeper;

pub use error::StoreError;
pub use rowlog::{RowLog, RowRecord};
pub use store::Store;
pub use sweeper::{spawn_snapshot_timer, spawn_sweeper};
