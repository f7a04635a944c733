use crate::cache::protocol::{DataParams, DataRequest};
use crate::error::{CacheError, Result};

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Registration, membership listing and client routing all share this endpoint;
/// the `action` parameter says which one a request is.
pub const ENDPOINT_REGISTRY: &str = "/mcache";
/// Body of a successful registration.
pub const REGISTER_SUCCESS: &str = "success";

/// Liveness of a registered member as seen by its heartbeat supervisor.
///
/// `Suspect` members are still routable: they stay in the ring until the dead-node
/// worker confirms the failure and removes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberState {
    Alive,
    Suspect,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: String,
    pub state: MemberState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAction {
    Register,
    Members,
    Ping,
    Get,
    Set,
    Delete,
}

impl FromStr for RegistryAction {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "register" => Ok(RegistryAction::Register),
            "members" => Ok(RegistryAction::Members),
            "ping" => Ok(RegistryAction::Ping),
            "get" => Ok(RegistryAction::Get),
            "set" => Ok(RegistryAction::Set),
            "delete" | "del" => Ok(RegistryAction::Delete),
            other => Err(CacheError::invalid(format!("unknown action: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryParams {
    pub action: Option<String>,
    pub name: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
}

/// A validated registry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryRequest {
    Register { name: String },
    Members,
    Ping,
    Route(DataRequest),
}

impl TryFrom<RegistryParams> for RegistryRequest {
    type Error = CacheError;

    fn try_from(params: RegistryParams) -> Result<Self> {
        let action: RegistryAction = params
            .action
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| CacheError::invalid("action is required"))?
            .parse()?;

        match action {
            RegistryAction::Register => {
                let name = params
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| CacheError::invalid("node's name is required"))?;
                Ok(RegistryRequest::Register { name })
            }
            RegistryAction::Members => Ok(RegistryRequest::Members),
            RegistryAction::Ping => Ok(RegistryRequest::Ping),
            RegistryAction::Get | RegistryAction::Set | RegistryAction::Delete => {
                let request = DataRequest::try_from(DataParams {
                    action: params.action,
                    key: params.key,
                    value: params.value,
                })?;
                Ok(RegistryRequest::Route(request))
            }
        }
    }
}
