//! Registry Module
//!
//! Cluster membership and client routing for cache nodes.
//!
//! ## Membership
//! Nodes register by base URL. The registry keeps them on a consistent-hash ring and in
//! a node table, and serves the member list nodes use to build their peer rings.
//!
//! ## Failure Detection
//! - **Heartbeat supervisors**: one per member, probing `action=ping` on a fixed interval.
//! - **Dead-node worker**: a single task fed by a bounded queue. It re-probes each suspect
//!   and either removes it from the ring and table together or restarts its supervisor.
//!
//! ## Submodules
//! - **`service`**: `Registry`, supervisors and the dead-node worker.
//! - **`client`**: HTTP handles to cache nodes and the node-side `RegistryClient`.
//! - **`types`**: member states and request validation.
//! - **`handlers`**: Axum handler for the `/mcache` endpoint.

pub mod client;
pub mod handlers;
pub mod service;
pub mod types;

pub use client::{NodeHandle, RegistryClient};
pub use service::{Registry, TopologySnapshot};
pub use types::{MemberInfo, MemberState};

#[cfg(test)]
mod tests;
