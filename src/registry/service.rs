use super::client::NodeHandle;
use super::types::{MemberInfo, MemberState};
use crate::cache::protocol::DataRequest;
use crate::config::RegistryConfig;
use crate::error::{CacheError, Result};
use crate::ring::HashRing;

use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ring and node table. Always mutated together under one write lock so a name
/// is either in both or in neither.
struct Topology {
    ring: HashRing,
    nodes: HashMap<String, Arc<NodeHandle>>,
}

/// Supervision record of one member. The supervisor task owns its ticker and
/// failure counter; the registry keeps the handle and the observable state.
struct Heartbeat {
    state: MemberState,
    task: JoinHandle<()>,
}

/// Consistency view used by tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub ring_points: usize,
    pub ring_members: Vec<String>,
    pub table_members: Vec<String>,
}

pub struct Registry {
    config: RegistryConfig,
    topology: RwLock<Topology>,
    heartbeats: DashMap<String, Heartbeat>,
    dead_tx: mpsc::Sender<String>,
    dead_rx: Mutex<Option<mpsc::Receiver<String>>>,
    client: reqwest::Client,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let (dead_tx, dead_rx) = mpsc::channel(config.dead_queue_capacity.max(1));

        Arc::new(Self {
            topology: RwLock::new(Topology {
                ring: HashRing::new(config.replicas),
                nodes: HashMap::new(),
            }),
            heartbeats: DashMap::new(),
            dead_tx,
            dead_rx: Mutex::new(Some(dead_rx)),
            client: reqwest::Client::new(),
            config,
        })
    }

    /// Spawns the dead-node worker. Only the first call has an effect.
    ///
    /// Without it, suspects are never re-verified or removed and their supervisors
    /// wait on the hand-off queue once it fills.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let rx = self
            .dead_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(rx) = rx else {
            warn!("Dead-node worker already running");
            return None;
        };

        info!(
            "Starting registry (heartbeat every {:?}, probe timeout {:?})",
            self.config.heartbeat_interval, self.config.probe_timeout
        );

        let registry = Arc::downgrade(self);
        Some(tokio::spawn(dead_node_worker(registry, rx)))
    }

    /// Adds a node to the ring and table and starts supervising it.
    pub async fn register(self: &Arc<Self>, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(CacheError::invalid("node's name is required"));
        }

        {
            let mut topology = self.topology.write().await;
            if topology.nodes.contains_key(name) {
                return Err(CacheError::AlreadyExists(format!(
                    "node {} is already registered",
                    name
                )));
            }

            topology.ring.add([name]);
            topology.nodes.insert(
                name.to_string(),
                Arc::new(NodeHandle::new(name, self.client.clone())),
            );

            // Started under the lock so a concurrent removal sees table and supervisor together.
            self.spawn_heartbeat(name);
        }

        info!("Registered cache node {}", name);
        Ok(())
    }

    /// Node currently owning `key`.
    pub async fn resolve(&self, key: &str) -> Result<Arc<NodeHandle>> {
        let topology = self.topology.read().await;

        let owner = topology
            .ring
            .get(key)
            .ok_or_else(|| CacheError::NotFound("no cache nodes registered".to_string()))?;

        topology
            .nodes
            .get(&owner)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(format!("no such cache node: {}", owner)))
    }

    /// Proxies a client request to the owner of its key.
    pub async fn route(&self, request: &DataRequest) -> Result<(StatusCode, Bytes)> {
        let key = match request {
            DataRequest::Get { key } | DataRequest::Set { key, .. } | DataRequest::Delete { key } => key,
            DataRequest::Ping => return Err(CacheError::invalid("ping is not routable")),
        };

        let node = self.resolve(key).await?;
        debug!("Routing {} {} to {}", request.action(), key, node.name());
        node.forward(request, self.config.forward_timeout).await
    }

    pub async fn members(&self) -> Vec<MemberInfo> {
        let names = self.topology.read().await.ring.members();
        names
            .into_iter()
            .map(|name| {
                let state = self.member_state(&name).unwrap_or(MemberState::Alive);
                MemberInfo { name, state }
            })
            .collect()
    }

    pub fn member_state(&self, name: &str) -> Option<MemberState> {
        self.heartbeats.get(name).map(|hb| hb.state)
    }

    pub async fn snapshot(&self) -> TopologySnapshot {
        let topology = self.topology.read().await;
        let mut table_members: Vec<String> = topology.nodes.keys().cloned().collect();
        table_members.sort();

        TopologySnapshot {
            ring_points: topology.ring.points(),
            ring_members: topology.ring.members(),
            table_members,
        }
    }

    async fn handle(&self, name: &str) -> Option<Arc<NodeHandle>> {
        self.topology.read().await.nodes.get(name).cloned()
    }

    fn spawn_heartbeat(self: &Arc<Self>, name: &str) {
        let supervisor = Supervisor {
            registry: Arc::downgrade(self),
            name: name.to_string(),
            interval: self.config.heartbeat_interval,
            timeout: self.config.probe_timeout,
            threshold: self.config.failure_threshold.max(1),
        };

        let task = tokio::spawn(supervisor.run());
        let previous = self.heartbeats.insert(
            name.to_string(),
            Heartbeat {
                state: MemberState::Alive,
                task,
            },
        );

        if let Some(previous) = previous {
            previous.task.abort();
        }
    }

    fn mark(&self, name: &str, state: MemberState) {
        if let Some(mut hb) = self.heartbeats.get_mut(name) {
            hb.state = state;
        }
    }

    /// Re-probes a member handed over by its supervisor. Still dead means removal;
    /// alive means a fresh supervisor.
    async fn verify_dead(self: &Arc<Self>, name: &str) {
        let Some(node) = self.handle(name).await else {
            debug!("{} already removed", name);
            return;
        };

        match node.ping(self.config.probe_timeout).await {
            Ok(()) => {
                info!("{} answered re-verification, keeping it", name);
                self.mark(name, MemberState::Alive);
                self.spawn_heartbeat(name);
            }
            Err(e) => {
                warn!("{} failed re-verification: {}", name, e);
                self.remove(name).await;
            }
        }
    }

    async fn remove(&self, name: &str) {
        {
            let mut topology = self.topology.write().await;
            if topology.nodes.remove(name).is_none() {
                return;
            }
            if let Err(e) = topology.ring.delete(name) {
                warn!("Failed to remove {} from the ring: {}", name, e);
            }
            if let Some((_, hb)) = self.heartbeats.remove(name) {
                hb.task.abort();
            }
        }

        info!("Removed dead cache node {}", name);
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for hb in self.heartbeats.iter() {
            hb.task.abort();
        }
    }
}

/// Periodically probes one member. After `threshold` consecutive failures the
/// member is marked suspect, handed to the dead-node worker, and the supervisor stops.
struct Supervisor {
    registry: Weak<Registry>,
    name: String,
    interval: Duration,
    timeout: Duration,
    threshold: u32,
}

impl Supervisor {
    async fn run(self) {
        // Spread the first probe so members registered together are not probed in lockstep.
        let jitter_ms = rand::thread_rng().gen_range(0..=self.interval.as_millis() as u64 / 10);
        let start = tokio::time::Instant::now() + self.interval + Duration::from_millis(jitter_ms);
        let mut ticker = tokio::time::interval_at(start, self.interval);
        let mut failures = 0u32;

        loop {
            ticker.tick().await;

            let Some(registry) = self.registry.upgrade() else {
                return;
            };
            let Some(node) = registry.handle(&self.name).await else {
                debug!("{} is no longer registered, stopping heartbeat", self.name);
                return;
            };

            match node.ping(self.timeout).await {
                Ok(()) => {
                    if failures > 0 {
                        info!("{} recovered after {} failed probe(s)", self.name, failures);
                    }
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Heartbeat to {} failed ({}/{}): {}",
                        self.name, failures, self.threshold, e
                    );

                    if failures >= self.threshold {
                        registry.mark(&self.name, MemberState::Suspect);

                        // Only the sender is held while the queue is full, not the registry.
                        let dead_tx = registry.dead_tx.clone();
                        drop(registry);
                        if dead_tx.send(self.name.clone()).await.is_err() {
                            warn!("Dead-node queue closed, {} stays suspect", self.name);
                        }
                        return;
                    }
                }
            }
        }
    }
}

async fn dead_node_worker(registry: Weak<Registry>, mut rx: mpsc::Receiver<String>) {
    while let Some(name) = rx.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.verify_dead(&name).await;
    }

    debug!("Dead-node worker stopped");
}
