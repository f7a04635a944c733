//! Runtime tunables for cache nodes and the registry.
//!
//! Defaults live in constants so library code and the CLI agree on them.

use std::net::SocketAddr;
use std::time::Duration;

/// Default byte budget of a node's local shard.
pub const DEFAULT_CACHE_BYTES: usize = 2 << 20;
/// Virtual replicas per node on the peer ring.
pub const DEFAULT_PEER_REPLICAS: usize = 50;
/// Virtual replicas per node on the registry ring.
pub const DEFAULT_REGISTRY_REPLICAS: usize = 1;
/// Upper bound on a single peer RPC.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(2);
/// How often a node refreshes its peer list from the registry.
pub const DEFAULT_PEER_SYNC_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Capacity of the queue between heartbeat supervisors and the dead-node worker.
pub const DEFAULT_DEAD_QUEUE_CAPACITY: usize = 5;
/// Consecutive failed probes before a member is handed to the dead-node worker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 1;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind: SocketAddr,
    /// Base URL other nodes and the registry use to reach this node.
    pub advertise: String,
    pub cache_bytes: usize,
    pub registry: Option<String>,
    pub peer_replicas: usize,
    pub peer_timeout: Duration,
    pub peer_sync_interval: Duration,
}

impl NodeConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            advertise: format!("http://{}", bind),
            cache_bytes: DEFAULT_CACHE_BYTES,
            registry: None,
            peer_replicas: DEFAULT_PEER_REPLICAS,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            peer_sync_interval: DEFAULT_PEER_SYNC_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub replicas: usize,
    pub heartbeat_interval: Duration,
    pub probe_timeout: Duration,
    pub dead_queue_capacity: usize,
    pub failure_threshold: u32,
    /// Upper bound on a client request proxied to a cache node.
    pub forward_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_REGISTRY_REPLICAS,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            dead_queue_capacity: DEFAULT_DEAD_QUEUE_CAPACITY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            forward_timeout: DEFAULT_PEER_TIMEOUT,
        }
    }
}
