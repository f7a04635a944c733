use super::byte_store::{ByteStore, EvictionCallback};
use super::byteview::ByteView;
use crate::error::{CacheError, Result};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe handle around a [`ByteStore`].
///
/// The store is only allocated on first write. Reads take the same lock as
/// writes because a hit reorders the recency list.
pub struct CacheShard {
    cache_bytes: usize,
    on_evicted: Option<EvictionCallback>,
    store: Mutex<Option<ByteStore>>,
}

impl CacheShard {
    pub fn new(cache_bytes: usize) -> Self {
        Self::with_eviction_callback(cache_bytes, None)
    }

    pub fn with_eviction_callback(cache_bytes: usize, on_evicted: Option<EvictionCallback>) -> Self {
        Self {
            cache_bytes,
            on_evicted,
            store: Mutex::new(None),
        }
    }

    pub fn add(&self, key: &str, value: ByteView) -> Result<()> {
        let mut guard = self.lock();
        let store = guard
            .get_or_insert_with(|| ByteStore::new(self.cache_bytes, self.on_evicted.clone()));
        store.add(key, value)
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.lock().as_mut().and_then(|store| store.get(key))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        match self.lock().as_mut() {
            Some(store) => store.delete(key).map(|_| ()),
            None => Err(CacheError::NotFound(format!("key {} does not exist", key))),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().as_ref().map(ByteStore::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().as_ref().map(ByteStore::used_bytes).unwrap_or(0)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.cache_bytes
    }

    fn lock(&self) -> MutexGuard<'_, Option<ByteStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
