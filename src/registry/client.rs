//! HTTP clients on both sides of the registry.
//!
//! [`NodeHandle`] is the registry's view of one cache node: heartbeat probes and
//! proxied client requests. [`RegistryClient`] is a cache node's view of the registry:
//! self-registration and peer-list sync.

use super::types::{ENDPOINT_REGISTRY, MembersResponse, REGISTER_SUCCESS};
use crate::cache::HttpPeerPool;
use crate::cache::protocol::{DataRequest, ENDPOINT_DATA, PING_ACK};
use crate::error::{CacheError, Result};

use anyhow::{Context, bail};
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

pub struct NodeHandle {
    name: String,
    client: reqwest::Client,
}

impl NodeHandle {
    pub fn new(name: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A node is alive when it answers `action=ping` with `200 pong` within `timeout`.
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        let url = format!("{}{}", self.name, ENDPOINT_DATA);

        let response = self
            .client
            .get(url)
            .query(&[("action", "ping")])
            .timeout(timeout)
            .send()
            .await
            .map_err(CacheError::unavailable)?;

        let status = response.status();
        let body = response.text().await.map_err(CacheError::unavailable)?;

        if status != StatusCode::OK || body != PING_ACK {
            return Err(CacheError::Unavailable(format!(
                "{} answered ping with {} {:?}",
                self.name, status, body
            )));
        }

        Ok(())
    }

    /// Relays a client request to the node and returns its status and body as-is.
    pub async fn forward(&self, request: &DataRequest, timeout: Duration) -> Result<(StatusCode, Bytes)> {
        let url = format!("{}{}", self.name, ENDPOINT_DATA);

        let response = self
            .client
            .get(url)
            .query(&request.to_params())
            .timeout(timeout)
            .send()
            .await
            .map_err(CacheError::unavailable)?;

        let status = response.status();
        let body = response.bytes().await.map_err(CacheError::unavailable)?;
        Ok((status, body))
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle").field("name", &self.name).finish()
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn register(&self, name: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .get(self.url())
            .query(&[("action", "register"), ("name", name)])
            .send()
            .await
            .with_context(|| format!("failed to reach registry at {}", self.base_url))?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK || body != REGISTER_SUCCESS {
            bail!("registry rejected {}: {} {}", name, status, body);
        }

        tracing::info!("Registered {} with {}", name, self.base_url);
        Ok(())
    }

    pub async fn members(&self) -> anyhow::Result<Vec<String>> {
        let response = self
            .client
            .get(self.url())
            .query(&[("action", "members")])
            .send()
            .await
            .with_context(|| format!("failed to reach registry at {}", self.base_url))?
            .error_for_status()?;

        let members: MembersResponse = response.json().await?;
        Ok(members.members.into_iter().map(|m| m.name).collect())
    }

    /// Refreshes `pool` from the registry's member list every `interval`.
    /// A failed poll keeps the previous peer set.
    pub async fn sync_peers(self, pool: Arc<HttpPeerPool>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        let mut last: Vec<String> = Vec::new();

        loop {
            ticker.tick().await;

            match self.members().await {
                Ok(members) if members != last => {
                    tracing::info!("Peer list changed: {:?}", members);
                    pool.set_peers(&members);
                    last = members;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Peer sync failed: {:#}", e),
            }
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, ENDPOINT_REGISTRY)
    }
}
