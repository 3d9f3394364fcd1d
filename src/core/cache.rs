//! Frame-based caching of objects that outlive a single render graph execution.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_used: u64,
}

/// A cache that tracks the last frame each entry was used in. Entries that were not accessed for
/// `ttl` frames are handed back to the caller through [`FrameCache::collect()`] so they can be destroyed.
#[derive(Debug)]
pub struct FrameCache<K, V> {
    ttl: u64,
    store: HashMap<K, Entry<V>>,
}

impl<K: Hash + Eq + Clone, V> FrameCache<K, V> {
    /// Create an empty cache that evicts entries after `ttl` frames without use.
    pub fn new(ttl: u64) -> Self {
        Self {
            ttl,
            store: HashMap::new(),
        }
    }

    /// Look up an entry, creating it with `create` if it does not exist yet.
    /// Marks the entry as used in `frame`.
    /// # Errors
    /// Fails if `create` was called and failed. The cache is left unchanged in that case.
    pub fn get_or_try_insert_with<F>(&mut self, key: &K, frame: u64, create: F) -> Result<&V>
    where
        F: FnOnce() -> Result<V>, {
        let entry = match self.store.entry(key.clone()) {
            MapEntry::Occupied(entry) => entry.into_mut(),
            MapEntry::Vacant(entry) => entry.insert(Entry {
                value: create()?,
                last_used: frame,
            }),
        };
        entry.last_used = entry.last_used.max(frame);
        Ok(&entry.value)
    }

    /// Remove every entry that has not been used for at least `ttl` frames as of `frame`, and return them.
    pub fn collect(&mut self, frame: u64) -> Vec<V> {
        let ttl = self.ttl;
        let expired = self
            .store
            .iter()
            .filter(|(_, entry)| frame.saturating_sub(entry.last_used) >= ttl)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        expired
            .into_iter()
            .filter_map(|key| self.store.remove(&key))
            .map(|entry| entry.value)
            .collect()
    }

    /// Amount of live entries in the cache.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
