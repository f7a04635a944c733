//! Local Storage Module
//!
//! Implements the bounded, in-memory store each cache node keeps for the keys it serves.
//!
//! ## Core Concepts
//! - **ByteView**: immutable, cheaply clonable value bytes shared with readers without copying.
//! - **ByteStore**: byte-budgeted LRU; usage is `len(key) + len(value)` summed over live entries,
//!   and growth past the budget evicts from the least-recently-used end.
//! - **CacheShard**: lazily allocated, mutex-guarded `ByteStore` shared by a node's request tasks.

pub mod byte_store;
pub mod byteview;
pub mod shard;

pub use byte_store::{ByteStore, EvictionCallback};
pub use byteview::ByteView;
pub use shard::CacheShard;
