//! Byte-budgeted LRU store.
//!
//! Sizes are accounted as `key.len() + value.len()`. Whenever usage grows past
//! `max_bytes`, entries are evicted from the least-recently-used end until the
//! budget holds again. A budget of `0` disables eviction entirely.

use super::byteview::ByteView;
use crate::error::{CacheError, Result};

use lru::LruCache;
use std::sync::Arc;

/// Invoked once per evicted entry. Must not call back into the store.
pub type EvictionCallback = Arc<dyn Fn(&str, &ByteView) + Send + Sync>;

pub struct ByteStore {
    max_bytes: usize,
    used_bytes: usize,
    entries: LruCache<String, ByteView>,
    on_evicted: Option<EvictionCallback>,
}

fn entry_size(key: &str, value: &ByteView) -> usize {
    key.len() + value.len()
}

impl ByteStore {
    pub fn new(max_bytes: usize, on_evicted: Option<EvictionCallback>) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            entries: LruCache::unbounded(),
            on_evicted,
        }
    }

    /// Inserts or replaces `key`, marking it most recently used.
    pub fn add(&mut self, key: &str, value: ByteView) -> Result<()> {
        if let Some(existing) = self.entries.get_mut(key) {
            let old_len = existing.len();
            self.used_bytes = self.used_bytes + value.len() - old_len;
            *existing = value;
        } else {
            self.used_bytes += entry_size(key, &value);
            self.entries.push(key.to_string(), value);
        }

        self.evict_oldest()
    }

    /// Looks up `key`; a hit counts as a use.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        self.entries.get(key).cloned()
    }

    pub fn delete(&mut self, key: &str) -> Result<ByteView> {
        let value = self
            .entries
            .pop(key)
            .ok_or_else(|| CacheError::NotFound(format!("key {} does not exist", key)))?;

        self.used_bytes -= entry_size(key, &value);
        Ok(value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Sums entry sizes from scratch without touching recency. Must always equal
    /// [`ByteStore::used_bytes`].
    pub fn recount_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, value)| entry_size(key, value))
            .sum()
    }

    fn evict_oldest(&mut self) -> Result<()> {
        if self.max_bytes == 0 {
            return Ok(());
        }

        while self.used_bytes > self.max_bytes {
            let Some((key, value)) = self.entries.pop_lru() else {
                tracing::error!(
                    used_bytes = self.used_bytes,
                    max_bytes = self.max_bytes,
                    "Byte accounting reports usage but the recency list is empty"
                );
                return Err(CacheError::Internal(format!(
                    "{} bytes accounted with no live entries",
                    self.used_bytes
                )));
            };

            self.used_bytes -= entry_size(&key, &value);
            tracing::debug!("Evicted {} ({} bytes)", key, entry_size(&key, &value));

            if let Some(callback) = &self.on_evicted {
                callback(&key, &value);
            }
        }

        Ok(())
    }
}
