//! Request Deduplication Module
//!
//! Collapses concurrent calls for the same key into a single execution, so a burst of
//! misses on one hot key turns into one expensive fetch.
//!
//! ## Guarantees
//! - **One executor per key**: the first caller runs the work; later callers for the same
//!   key suspend until it finishes and receive the identical `Result`.
//! - **Independent keys**: calls for different keys never wait on each other.
//! - **No retries**: a failure is handed to every waiter verbatim.
//! - **Detached execution**: the work runs in its own task. Dropping any caller, including the
//!   one that started it, does not cancel it.
//! - **Short-lived entries**: an entry exists only while its call is in flight. If the work
//!   panics, the entry is dropped and waiters are released with `Unavailable`.

pub mod group;

pub use group::CallGroup;
