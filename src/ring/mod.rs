//! Consistent Hashing Module
//!
//! Maps arbitrary string keys onto a set of named members so that membership churn
//! only moves the keys owned by the member that joined or left.
//!
//! ## Core Concepts
//! - **Virtual replicas**: every member is hashed onto the ring `replicas` times
//!   (`"{i}{member}"`), smoothing the load across members.
//! - **Lookup**: a key belongs to the first ring point at or after its hash, wrapping
//!   around to the first point when it hashes past the last one.
//! - **Injectable hash**: CRC-32 (IEEE) by default, replaceable for tests.

pub mod hash_ring;

pub use hash_ring::{HashFn, HashRing};

#[cfg(test)]
mod tests;
