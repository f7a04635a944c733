//! Cache Node Network Protocol
//!
//! Endpoints, request validation and the peer RPC messages exchanged between nodes.
//!
//! Client requests arrive as query strings (`?action=get&key=k`). They are validated
//! exactly once, at the boundary, into a [`DataRequest`]; everything past that point
//! matches on a closed enum instead of comparing strings.
//!
//! Peer RPC bodies are bincode-encoded [`PeerRequest`] / [`PeerResponse`] messages.

use crate::error::{CacheError, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- API Endpoints ---

/// Client data endpoint (`get`, `set`, `delete`, `ping`).
pub const ENDPOINT_DATA: &str = "/cache";
/// Peer-to-peer fetch of a key from its owning node.
pub const ENDPOINT_PEER_GET: &str = "/_peer/get";
/// Per-node counters.
pub const ENDPOINT_STATS: &str = "/stats";

/// Body of a successful `ping`.
pub const PING_ACK: &str = "pong";
/// Body of a successful `set` / `delete`.
pub const STATUS_SUCCESS: &str = "success";

// --- Actions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Get,
    Set,
    Delete,
    Ping,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Delete => "delete",
            Action::Ping => "ping",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Action::Get),
            "set" => Ok(Action::Set),
            "delete" | "del" => Ok(Action::Delete),
            "ping" => Ok(Action::Ping),
            other => Err(CacheError::invalid(format!("unknown action: {}", other))),
        }
    }
}

// --- Data Transfer Objects ---

/// Raw query parameters of the data endpoint, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataParams {
    pub action: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
}

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRequest {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
    Ping,
}

impl DataRequest {
    pub fn action(&self) -> Action {
        match self {
            DataRequest::Get { .. } => Action::Get,
            DataRequest::Set { .. } => Action::Set,
            DataRequest::Delete { .. } => Action::Delete,
            DataRequest::Ping => Action::Ping,
        }
    }

    /// Query string parameters that reproduce this request on another node.
    pub fn to_params(&self) -> DataParams {
        let action = Some(self.action().as_str().to_string());
        match self {
            DataRequest::Get { key } | DataRequest::Delete { key } => DataParams {
                action,
                key: Some(key.clone()),
                value: None,
            },
            DataRequest::Set { key, value } => DataParams {
                action,
                key: Some(key.clone()),
                value: Some(value.clone()),
            },
            DataRequest::Ping => DataParams {
                action,
                ..DataParams::default()
            },
        }
    }
}

impl TryFrom<DataParams> for DataRequest {
    type Error = CacheError;

    fn try_from(params: DataParams) -> Result<Self> {
        let action: Action = non_empty(params.action)
            .ok_or_else(|| CacheError::invalid("action is required"))?
            .parse()?;

        if action == Action::Ping {
            return Ok(DataRequest::Ping);
        }

        let key = non_empty(params.key).ok_or_else(|| CacheError::invalid("key is required"))?;

        match action {
            Action::Get => Ok(DataRequest::Get { key }),
            Action::Delete => Ok(DataRequest::Delete { key }),
            Action::Set => {
                let value = non_empty(params.value)
                    .ok_or_else(|| CacheError::invalid("value is required"))?;
                Ok(DataRequest::Set { key, value })
            }
            Action::Ping => Ok(DataRequest::Ping),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Peer RPC request: which key the caller wants from the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRequest {
    pub key: String,
}

/// Peer RPC response: the owner's bytes for the key (empty when it has none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerResponse {
    pub value: Vec<u8>,
}

pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    bincode::serialize(message)
        .map_err(|e| CacheError::Internal(format!("failed to encode peer message: {}", e)))
}

pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| CacheError::invalid(format!("failed to decode peer message: {}", e)))
}
