//! Cache Node Module
//!
//! The per-process cache and the HTTP surface around it.
//!
//! ## Read Path
//! - **Local**: the node's `CacheShard` answers hits directly.
//! - **Peer**: on a miss, the `PeerPicker` maps the key to its owning node and the value is
//!   fetched over the peer RPC (bounded by a timeout).
//! - **Origin**: if the key is self-owned or the peer fails, the caller-supplied loader is
//!   consulted and its result is cached locally.
//!
//! Concurrent misses for one key are collapsed by a `CallGroup`.
//!
//! ## Submodules
//! - **`node`**: `CacheNode`, the get/set/delete API and the miss path.
//! - **`peers`**: `PeerPicker` / `PeerGetter` abstractions and the HTTP peer pool.
//! - **`protocol`**: endpoints, action validation, peer RPC messages.
//! - **`handlers`**: Axum handlers for the node endpoints.

pub mod handlers;
pub mod node;
pub mod peers;
pub mod protocol;

pub use node::{CacheNode, LoaderFn, NodeStats, loader_fn};
pub use peers::{HttpPeer, HttpPeerPool, PeerGetter, PeerPicker};
