//! # beacon-types: Core types for Beacon
//!
//! This crate contains shared types used across the Beacon service registry:
//! - Node identity ([`NodeId`], [`PeerId`])
//! - Runtime role ([`Role`], [`RoleCell`], [`RoleReader`])
//! - Record provenance ([`Origin`])
//! - Temporal types ([`Timestamp`])
//! - The registration unit ([`ObjectRecord`])

use std::fmt::{self, Display};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

// ============================================================================
// Node identity
// ============================================================================

/// Runtime identifier of a registry node.
///
/// Generated once per process; the lexicographic ordering of node ids is the
/// deterministic tie-break for leader election, so ids are kept short,
/// lowercase, and alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

/// Length of a generated node id, in characters.
const NODE_ID_LEN: usize = 8;

impl NodeId {
    /// Generates a fresh random node id.
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NODE_ID_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(id)
    }

    /// Creates a node id from an explicit string (tests, simulations).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configured identifier of a peer node.
///
/// Distinct from [`NodeId`]: peer ids come from the static cluster
/// configuration and are stable across restarts, while node ids are random
/// per process.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Role
// ============================================================================

/// Runtime role of a node.
///
/// Only the primary accepts direct client writes; both roles serve reads.
/// The role is derived by the election loop and never written elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Accepts client writes and fans them out to peers.
    Primary,
    /// Applies replicated writes and serves (possibly lagging) reads.
    Backup,
}

impl Role {
    pub fn as_u8(self) -> u8 {
        match self {
            Role::Primary => 0,
            Role::Backup => 1,
        }
    }

    pub fn from_u8(byte: u8) -> Role {
        match byte {
            0 => Role::Primary,
            _ => Role::Backup,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Backup => f.write_str("backup"),
        }
    }
}

/// Shared, atomically updated role flag.
///
/// The election loop is the only writer; every other component reads the
/// cell (or a [`RoleReader`] view of it) instead of holding a back-pointer
/// into the node runtime.
#[derive(Debug, Clone)]
pub struct RoleCell {
    inner: Arc<AtomicU8>,
}

impl RoleCell {
    pub fn new(initial: Role) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(initial.as_u8())),
        }
    }

    pub fn get(&self) -> Role {
        Role::from_u8(self.inner.load(Ordering::SeqCst))
    }

    pub fn set(&self, role: Role) {
        self.inner.store(role.as_u8(), Ordering::SeqCst);
    }

    pub fn is_primary(&self) -> bool {
        self.get() == Role::Primary
    }

    /// Returns a read-only view of this cell.
    pub fn reader(&self) -> RoleReader {
        RoleReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Read-only view of a [`RoleCell`].
#[derive(Debug, Clone)]
pub struct RoleReader {
    inner: Arc<AtomicU8>,
}

impl RoleReader {
    pub fn get(&self) -> Role {
        Role::from_u8(self.inner.load(Ordering::SeqCst))
    }

    pub fn is_primary(&self) -> bool {
        self.get() == Role::Primary
    }
}

// ============================================================================
// Record provenance
// ============================================================================

/// Marks whether a record was authored on this node or received via
/// replication.
///
/// Only `Local` records are subject to TTL eviction: the authoritative copy
/// of a `Replica` record lives on the primary, which replicates the
/// deregistration when it expires there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Registered by a client talking to this node.
    Local,
    /// Received as a replication echo from the primary.
    Replica,
}

impl Origin {
    pub fn is_local(self) -> bool {
        self == Origin::Local
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Replica => f.write_str("replica"),
        }
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// Wall-clock timestamp in seconds since the Unix epoch.
///
/// Stored as `f64` to match the durable row layout (`last_seen REAL`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0.0);

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        Self(secs)
    }

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// Seconds elapsed from `earlier` to `self`; negative if `earlier` is in
    /// the future.
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }

    /// Returns the later of the two timestamps.
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 { other } else { self }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

// ============================================================================
// Object record
// ============================================================================

/// The unit of registration: one named service endpoint plus metadata.
///
/// The registry map key is the object name; the record holds everything
/// else. `last_seen` monotonically increases while the record exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Reachable endpoint of the registered service, opaque to the registry.
    pub address: String,
    /// Implementation language reported by the client.
    pub language: String,
    /// Version string reported by the client.
    pub version: String,
    /// Deployment region reported by the client.
    pub region: String,
    /// Wall-clock time of the most recent register/update/heartbeat.
    pub last_seen: Timestamp,
    /// Whether this record was authored locally or replicated.
    pub origin: Origin,
}

impl ObjectRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        address: impl Into<String>,
        language: impl Into<String>,
        version: impl Into<String>,
        region: impl Into<String>,
        origin: Origin,
    ) -> Self {
        Self {
            address: address.into(),
            language: language.into(),
            version: version.into(),
            region: region.into(),
            last_seen: Timestamp::now(),
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_short_and_lowercase() {
        let id = NodeId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn node_ids_are_distinct() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn role_round_trips_through_u8() {
        assert_eq!(Role::from_u8(Role::Primary.as_u8()), Role::Primary);
        assert_eq!(Role::from_u8(Role::Backup.as_u8()), Role::Backup);
    }

    #[test]
    fn role_cell_reader_tracks_writes() {
        let cell = RoleCell::new(Role::Backup);
        let reader = cell.reader();
        assert!(!reader.is_primary());

        cell.set(Role::Primary);
        assert!(reader.is_primary());
        assert_eq!(reader.get(), Role::Primary);
    }

    #[test]
    fn timestamp_ordering_and_elapsed() {
        let a = Timestamp::from_secs(100.0);
        let b = Timestamp::from_secs(102.5);
        assert!(b > a);
        assert!((b.seconds_since(a) - 2.5).abs() < f64::EPSILON);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
    }

    #[test]
    fn replica_origin_is_not_local() {
        assert!(Origin::Local.is_local());
        assert!(!Origin::Replica.is_local());
    }

    #[test]
    fn object_record_stamps_current_time() {
        let before = Timestamp::now();
        let rec = ObjectRecord::new("10.0.0.1:6000", "Rust", "1.0", "EU", Origin::Local);
        assert!(rec.last_seen >= before);
        assert_eq!(rec.origin, Origin::Local);
    }
}
