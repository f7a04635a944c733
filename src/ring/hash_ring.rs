use crate::error::{CacheError, Result};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Hash function used to place members and keys on the ring.
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

#[derive(Default)]
struct RingState {
    /// Sorted ascending, one entry per virtual replica.
    points: Vec<u32>,
    owners: HashMap<u32, String>,
}

pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    state: RwLock<RingState>,
}

impl HashRing {
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, Arc::new(crc32fast::hash))
    }

    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            replicas: replicas.max(1),
            hash,
            state: RwLock::new(RingState::default()),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Places every member on the ring.
    ///
    /// Adding a member that is already present duplicates its points; callers are
    /// expected to check membership first.
    pub fn add<I, S>(&self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.write();

        for member in members {
            let member = member.as_ref();
            for i in 0..self.replicas {
                let point = (self.hash)(format!("{}{}", i, member).as_bytes());
                state.points.push(point);
                state.owners.insert(point, member.to_string());
            }
        }

        state.points.sort_unstable();
    }

    /// Returns the member owning `key`, or `None` when the ring is empty.
    pub fn get(&self, key: &str) -> Option<String> {
        let state = self.read();
        if state.points.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = state.points.partition_point(|&point| point < hash);
        let point = state.points[idx % state.points.len()];

        state.owners.get(&point).cloned()
    }

    /// Removes every point belonging to `member`. Unknown members are a no-op.
    pub fn delete(&self, member: &str) -> Result<()> {
        if member.is_empty() {
            return Err(CacheError::invalid("ring member name is required"));
        }

        let mut state = self.write();
        let RingState { points, owners } = &mut *state;

        owners.retain(|_, owner| owner != member);
        points.retain(|point| owners.contains_key(point));

        Ok(())
    }

    /// Distinct member names, sorted.
    pub fn members(&self) -> Vec<String> {
        let state = self.read();
        state
            .owners
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().points.is_empty()
    }

    /// Number of virtual points, `replicas` per member added.
    pub fn points(&self) -> usize {
        self.read().points.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("points", &state.points.len())
            .finish()
    }
}
