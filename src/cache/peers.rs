//! Peer resolution.
//!
//! A [`PeerPicker`] decides which node owns a key; a [`PeerGetter`] fetches the key
//! from that node. [`HttpPeerPool`] is the production picker: a consistent-hash ring of
//! peer base URLs with one [`HttpPeer`] per URL.

use super::protocol::{ENDPOINT_PEER_GET, PeerRequest, PeerResponse, decode_message, encode_message};
use crate::error::{CacheError, Result};
use crate::ring::HashRing;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub type PeerFuture<'a> = Pin<Box<dyn Future<Output = Result<PeerResponse>> + Send + 'a>>;

/// Fetches keys from one remote node.
pub trait PeerGetter: Send + Sync {
    fn name(&self) -> &str;

    fn get<'a>(&'a self, request: &'a PeerRequest) -> PeerFuture<'a>;
}

/// Locates the node owning a key. Returns `None` when the key belongs to the
/// local node or no peers are known.
pub trait PeerPicker: Send + Sync {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

pub struct HttpPeer {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeer {
    pub fn new(base_url: &str, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    async fn fetch(&self, request: &PeerRequest) -> Result<PeerResponse> {
        let url = format!("{}{}", self.base_url, ENDPOINT_PEER_GET);
        tracing::debug!("Fetching {} from peer {}", request.key, url);

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(encode_message(request)?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(CacheError::unavailable)?;

        if !response.status().is_success() {
            return Err(CacheError::Unavailable(format!(
                "peer {} returned {}",
                self.base_url,
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(CacheError::unavailable)?;
        decode_message(&body)
            .map_err(|e| CacheError::Unavailable(format!("peer {}: {}", self.base_url, e)))
    }
}

impl PeerGetter for HttpPeer {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn get<'a>(&'a self, request: &'a PeerRequest) -> PeerFuture<'a> {
        Box::pin(self.fetch(request))
    }
}

struct PoolState {
    ring: HashRing,
    peers: HashMap<String, Arc<HttpPeer>>,
}

/// Consistent-hash picker over HTTP peers, identified by base URL.
pub struct HttpPeerPool {
    self_name: String,
    replicas: usize,
    timeout: Duration,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

impl HttpPeerPool {
    pub fn new(self_name: &str, replicas: usize, timeout: Duration) -> Self {
        Self {
            self_name: self_name.trim_end_matches('/').to_string(),
            replicas,
            timeout,
            client: reqwest::Client::new(),
            state: RwLock::new(PoolState {
                ring: HashRing::new(replicas),
                peers: HashMap::new(),
            }),
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Replaces the peer set. The local node should be part of `peers` so that
    /// keys it owns resolve to itself.
    pub fn set_peers<S: AsRef<str>>(&self, peers: &[S]) {
        let ring = HashRing::new(self.replicas);
        let mut getters = HashMap::with_capacity(peers.len());

        for peer in peers {
            let name = peer.as_ref().trim_end_matches('/');
            if getters.contains_key(name) {
                continue;
            }
            ring.add([name]);
            getters.insert(
                name.to_string(),
                Arc::new(HttpPeer::new(name, self.client.clone(), self.timeout)),
            );
        }

        tracing::info!("Peer ring rebuilt with {} member(s)", getters.len());

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = PoolState {
            ring,
            peers: getters,
        };
    }

    pub fn peers(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.ring.members()
    }

    /// Owner of `key` on the current ring, which may be the local node.
    pub fn owner_of(&self, key: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.ring.get(key)
    }
}

impl PeerPicker for HttpPeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let owner = state.ring.get(key)?;

        if owner == self.self_name {
            return None;
        }

        tracing::debug!("Picked peer {} for {}", owner, key);
        state
            .peers
            .get(&owner)
            .map(|peer| peer.clone() as Arc<dyn PeerGetter>)
    }
}
