//! # beacon-config: Node configuration
//!
//! One JSON document per node, loaded once at startup and layered as:
//! 1. Built-in defaults (lowest precedence)
//! 2. The JSON configuration file
//! 3. `BEACON_*` environment variables (highest precedence)
//!
//! ```json
//! {
//!   "self_address":  "127.0.0.1:7400",
//!   "hb_address":    "127.0.0.1:7401",
//!   "database":      "beacon.db",
//!   "ttl_seconds":   300.0,
//!   "bootstrap_primary": true,
//!   "peers": [
//!     {"id": "n2", "host": "127.0.0.1", "biz_port": 7410, "hb_port": 7411}
//!   ]
//! }
//! ```

mod error;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use beacon_types::PeerId;

pub use error::ConfigError;

/// Documented fallback values. Operators are expected to set `ttl_seconds`
/// explicitly; the fallback matches the replicated deployment profile.
pub mod defaults {
    pub const SELF_ADDRESS: &str = "127.0.0.1:7400";
    pub const HB_ADDRESS: &str = "127.0.0.1:7401";
    pub const DATABASE: &str = "beacon.db";
    pub const TTL_SECONDS: f64 = 300.0;
    pub const GC_INTERVAL_SECONDS: f64 = 5.0;
    pub const ELECT_INTERVAL_SECONDS: f64 = 2.0;
    pub const SNAPSHOT_INTERVAL_SECONDS: f64 = 300.0;
    pub const RPC_TIMEOUT_MS: u64 = 1000;
    pub const BUSINESS_WORKERS: usize = 10;
    pub const LIVENESS_WORKERS: usize = 4;
    pub const ACCEPT_QUEUE_CAPACITY: usize = 64;
    pub const IDLE_TIMEOUT_SECONDS: f64 = 60.0;
}

/// Static description of one cluster peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSpec {
    /// Stable configured identifier.
    pub id: PeerId,
    /// Hostname or IP address.
    pub host: String,
    /// Business-plane port.
    pub biz_port: u16,
    /// Liveness-plane port.
    pub hb_port: u16,
}

impl PeerSpec {
    /// Business-plane address of this peer.
    pub fn biz_addr(&self) -> String {
        format!("{}:{}", self.host, self.biz_port)
    }

    /// Liveness-plane address of this peer.
    pub fn hb_addr(&self) -> String {
        format!("{}:{}", self.host, self.hb_port)
    }
}

/// Complete configuration of one registry node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Business-plane bind address (`host:port`).
    pub self_address: String,
    /// Liveness-plane bind address (`host:port`).
    pub hb_address: String,
    /// Path of the durable row log.
    pub database: PathBuf,
    /// TTL window for locally-owned records, in seconds.
    pub ttl_seconds: f64,
    /// Whether this node assumes the primary role until the first election
    /// round completes.
    pub bootstrap_primary: bool,
    /// The other nodes of the cluster.
    pub peers: Vec<PeerSpec>,

    /// TTL sweep period, in seconds.
    pub gc_interval_seconds: f64,
    /// Election period, in seconds.
    pub elect_interval_seconds: f64,
    /// Full-snapshot period, in seconds.
    pub snapshot_interval_seconds: f64,
    /// Timeout for every outbound peer RPC, in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Worker pool size of the business plane.
    pub business_workers: usize,
    /// Worker pool size of the liveness plane.
    pub liveness_workers: usize,
    /// Accepted-connection queue capacity per plane.
    pub accept_queue_capacity: usize,
    /// Idle time after which a client connection is closed, in seconds.
    pub idle_timeout_seconds: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            self_address: defaults::SELF_ADDRESS.to_string(),
            hb_address: defaults::HB_ADDRESS.to_string(),
            database: PathBuf::from(defaults::DATABASE),
            ttl_seconds: defaults::TTL_SECONDS,
            bootstrap_primary: false,
            peers: Vec::new(),
            gc_interval_seconds: defaults::GC_INTERVAL_SECONDS,
            elect_interval_seconds: defaults::ELECT_INTERVAL_SECONDS,
            snapshot_interval_seconds: defaults::SNAPSHOT_INTERVAL_SECONDS,
            rpc_timeout_ms: defaults::RPC_TIMEOUT_MS,
            business_workers: defaults::BUSINESS_WORKERS,
            liveness_workers: defaults::LIVENESS_WORKERS,
            accept_queue_capacity: defaults::ACCEPT_QUEUE_CAPACITY,
            idle_timeout_seconds: defaults::IDLE_TIMEOUT_SECONDS,
        }
    }
}

impl NodeConfig {
    /// Loads configuration: defaults, then the JSON file at `path`, then
    /// `BEACON_*` environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let merged = config::Config::builder()
            .add_source(config::Config::try_from(&NodeConfig::default())?)
            .add_source(config::File::from(path.to_path_buf()).format(config::FileFormat::Json))
            .add_source(config::Environment::with_prefix("BEACON").try_parsing(true))
            .build()?;

        let cfg: NodeConfig = merged.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let own = parse_addr("self_address", &self.self_address)?;
        let hb = parse_addr("hb_address", &self.hb_address)?;
        // Port 0 means "pick for me", so two zero ports cannot collide.
        if own == hb && own.port() != 0 {
            return Err(ConfigError::Invalid(
                "self_address and hb_address must differ".to_string(),
            ));
        }

        for (field, value) in [
            ("ttl_seconds", self.ttl_seconds),
            ("gc_interval_seconds", self.gc_interval_seconds),
            ("elect_interval_seconds", self.elect_interval_seconds),
            ("snapshot_interval_seconds", self.snapshot_interval_seconds),
            ("idle_timeout_seconds", self.idle_timeout_seconds),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be a positive number, got {value}"
                )));
            }
        }

        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rpc_timeout_ms must be positive".to_string(),
            ));
        }
        for (field, value) in [
            ("business_workers", self.business_workers),
            ("liveness_workers", self.liveness_workers),
            ("accept_queue_capacity", self.accept_queue_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be positive")));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for peer in &self.peers {
            if peer.host.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "peer {} has an empty host",
                    peer.id
                )));
            }
            if !seen.insert(peer.id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate peer id: {}",
                    peer.id
                )));
            }
            if peer.biz_addr() == self.self_address {
                return Err(ConfigError::Invalid(format!(
                    "peer {} points at this node's own address",
                    peer.id
                )));
            }
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.ttl_seconds)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs_f64(self.gc_interval_seconds)
    }

    pub fn elect_interval(&self) -> Duration {
        Duration::from_secs_f64(self.elect_interval_seconds)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs_f64(self.snapshot_interval_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.idle_timeout_seconds)
    }
}

fn parse_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::Invalid(format!("{field} {value:?} is not host:port: {e}")))
}
