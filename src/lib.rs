//! Distributed Cache Library
//!
//! An in-memory key/value cache spread over a cluster of nodes, plus the registry
//! that tracks which nodes are alive. The binary (`main.rs`) runs either role.
//!
//! ## Architecture Modules
//! - **`ring`**: consistent hashing with virtual replicas; maps keys to owning nodes.
//! - **`storage`**: the byte-budgeted LRU store, its thread-safe shard wrapper and the
//!   immutable `ByteView` value type.
//! - **`singleflight`**: collapses concurrent loads of one key into a single execution.
//! - **`cache`**: `CacheNode` (local shard, peer fetch, origin loader), peer RPC and the
//!   node HTTP endpoints.
//! - **`registry`**: node registration, heartbeat supervision, dead-node removal and
//!   request routing.
//! - **`config`** / **`error`**: shared tunables and the error taxonomy.

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod ring;
pub mod singleflight;
pub mod storage;
