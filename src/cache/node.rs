//! The per-process cache.
//!
//! A [`CacheNode`] answers reads from its local shard first. On a miss it runs the load
//! procedure through its [`CallGroup`], so concurrent misses for one key share a single
//! fetch:
//!
//! 1. if a [`PeerPicker`] maps the key to another node, fetch it from that peer;
//! 2. otherwise, or when the peer fails, ask the origin loader and populate the shard;
//! 3. without a loader, return an empty value.
//!
//! Values fetched from a peer are not stored locally: the owning node's shard is the
//! only copy.
//!
//! Peer RPCs are answered through a second [`CallGroup`], so an inbound peer request
//! never waits on an outbound fetch of the same key. Two nodes that briefly disagree on
//! the owner of a key cannot block on each other.

use super::peers::{PeerGetter, PeerPicker};
use super::protocol::PeerRequest;
use crate::config::DEFAULT_PEER_TIMEOUT;
use crate::error::{CacheError, Result};
use crate::singleflight::CallGroup;
use crate::storage::{ByteView, CacheShard, EvictionCallback};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Future returned by an origin loader.
pub type LoaderFuture = Pin<Box<dyn Future<Output = anyhow::Result<Vec<u8>>> + Send>>;

/// Type-erased origin loader: maps a key to the bytes of its value.
pub type LoaderFn = Arc<dyn Fn(String) -> LoaderFuture + Send + Sync>;

/// Wraps an async closure into a [`LoaderFn`].
pub fn loader_fn<F, Fut>(loader: F) -> LoaderFn
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<u8>>> + Send + 'static,
{
    Arc::new(move |key: String| Box::pin(loader(key)) as LoaderFuture)
}

#[derive(Default)]
struct Counters {
    gets: AtomicU64,
    local_hits: AtomicU64,
    peer_hits: AtomicU64,
    peer_errors: AtomicU64,
    loader_hits: AtomicU64,
    empty_loads: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of a node's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub gets: u64,
    pub local_hits: u64,
    pub peer_hits: u64,
    pub peer_errors: u64,
    pub loader_hits: u64,
    pub empty_loads: u64,
    pub evictions: u64,
    pub entries: usize,
    pub used_bytes: usize,
}

pub struct CacheNode {
    id: String,
    shard: CacheShard,
    calls: CallGroup<ByteView>,
    peer_calls: CallGroup<ByteView>,
    loader: Option<LoaderFn>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    peer_timeout: Duration,
    counters: Arc<Counters>,
}

impl CacheNode {
    pub fn new(id: &str, cache_bytes: usize, loader: Option<LoaderFn>) -> Arc<Self> {
        Self::with_peer_timeout(id, cache_bytes, loader, DEFAULT_PEER_TIMEOUT)
    }

    pub fn with_peer_timeout(
        id: &str,
        cache_bytes: usize,
        loader: Option<LoaderFn>,
        peer_timeout: Duration,
    ) -> Arc<Self> {
        let counters = Arc::new(Counters::default());
        let eviction_counter = counters.clone();
        let on_evicted: EvictionCallback = Arc::new(move |_key: &str, _value: &ByteView| {
            eviction_counter.evictions.fetch_add(1, Ordering::Relaxed);
        });

        Arc::new(Self {
            id: id.to_string(),
            shard: CacheShard::with_eviction_callback(cache_bytes, Some(on_evicted)),
            calls: CallGroup::new(),
            peer_calls: CallGroup::new(),
            loader,
            peers: OnceLock::new(),
            peer_timeout,
            counters,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wires the node into the cluster. The peer topology of a node is fixed once
    /// set; a second call is rejected and the first picker stays in place.
    pub fn register_peer_picker(&self, picker: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers.set(picker).map_err(|_| {
            CacheError::AlreadyExists(format!(
                "peer picker already registered on node {}",
                self.id
            ))
        })
    }

    /// Writes into the local shard only.
    pub fn set(&self, key: &str, value: impl Into<ByteView>) -> Result<()> {
        validate_key(key)?;
        self.shard.add(key, value.into())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.shard.delete(key)
    }

    pub async fn get(self: &Arc<Self>, key: &str) -> Result<ByteView> {
        validate_key(key)?;
        self.counters.gets.fetch_add(1, Ordering::Relaxed);

        if let Some(value) = self.lookup_local(key) {
            tracing::debug!("[{}] local hit for {}", self.id, key);
            return Ok(value);
        }

        let node = Arc::clone(self);
        let owned = key.to_string();
        self.calls
            .work(key, move || async move { node.load(&owned).await })
            .await
    }

    /// Answers a peer RPC: local shard, then origin loader. Never forwards to
    /// another peer, so nodes with diverging rings cannot bounce a key back and forth.
    pub async fn serve_peer(self: &Arc<Self>, key: &str) -> Result<ByteView> {
        validate_key(key)?;

        if let Some(value) = self.lookup_local(key) {
            return Ok(value);
        }

        let node = Arc::clone(self);
        let owned = key.to_string();
        self.peer_calls
            .work(key, move || async move { node.load_from_origin(&owned).await })
            .await
    }

    /// Local shard only; no peer, no loader.
    pub fn lookup_local(&self, key: &str) -> Option<ByteView> {
        let value = self.shard.get(key)?;
        self.counters.local_hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    pub fn stats(&self) -> NodeStats {
        let c = &self.counters;
        NodeStats {
            gets: c.gets.load(Ordering::Relaxed),
            local_hits: c.local_hits.load(Ordering::Relaxed),
            peer_hits: c.peer_hits.load(Ordering::Relaxed),
            peer_errors: c.peer_errors.load(Ordering::Relaxed),
            loader_hits: c.loader_hits.load(Ordering::Relaxed),
            empty_loads: c.empty_loads.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            entries: self.shard.len(),
            used_bytes: self.shard.used_bytes(),
        }
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        if let Some(picker) = self.peers.get()
            && let Some(peer) = picker.pick_peer(key)
        {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => {
                    self.counters.peer_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e) => {
                    self.counters.peer_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "[{}] failed to get {} from peer {}: {}",
                        self.id,
                        key,
                        peer.name(),
                        e
                    );
                }
            }
        }

        self.load_from_origin(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let request = PeerRequest {
            key: key.to_string(),
        };

        let response = tokio::time::timeout(self.peer_timeout, peer.get(&request))
            .await
            .map_err(|_| {
                CacheError::Unavailable(format!(
                    "peer {} timed out after {:?}",
                    peer.name(),
                    self.peer_timeout
                ))
            })??;

        Ok(ByteView::from(response.value))
    }

    async fn load_from_origin(&self, key: &str) -> Result<ByteView> {
        let Some(loader) = &self.loader else {
            tracing::debug!("[{}] no loader configured, {} has no data", self.id, key);
            self.counters.empty_loads.fetch_add(1, Ordering::Relaxed);
            return Ok(ByteView::new());
        };

        let bytes = loader(key.to_string())
            .await
            .map_err(|e| CacheError::Loader(format!("{}: {}", key, e)))?;

        if bytes.is_empty() {
            self.counters.empty_loads.fetch_add(1, Ordering::Relaxed);
            return Ok(ByteView::new());
        }

        let value = ByteView::copy_from_slice(&bytes);
        self.shard.add(key, value.clone())?;
        self.counters.loader_hits.fetch_add(1, Ordering::Relaxed);

        tracing::debug!("[{}] loaded {} from origin ({} bytes)", self.id, key, value.len());
        Ok(value)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::invalid("key is required"));
    }
    Ok(())
}
