//! Byte-budgeted LRU cache.
//!
//! Eviction is driven only by the total byte size of the retained values;
//! the number of entries is unbounded.

use crate::bits::BitVector;
use lru::LruCache;
use std::hash::Hash;
use std::sync::Arc;

/// Values that report their resident size
pub trait ByteSized {
    /// Approximate heap bytes held by the value
    fn size_in_bytes(&self) -> usize;
}

impl ByteSized for BitVector {
    fn size_in_bytes(&self) -> usize {
        self.word_len() * std::mem::size_of::<u64>()
    }
}

impl<T: ByteSized + ?Sized> ByteSized for Arc<T> {
    fn size_in_bytes(&self) -> usize {
        (**self).size_in_bytes()
    }
}

/// LRU cache evicting least-recently-used entries once a byte budget is exceeded
pub struct SizedLruCache<K: Hash + Eq, V: ByteSized + Clone> {
    entries: LruCache<K, V>,
    budget_bytes: usize,
    size_bytes: usize,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq, V: ByteSized + Clone> std::fmt::Debug for SizedLruCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SizedLruCache")
            .field("entries", &self.entries.len())
            .field("budget_bytes", &self.budget_bytes)
            .field("size_bytes", &self.size_bytes)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl<K: Hash + Eq, V: ByteSized + Clone> SizedLruCache<K, V> {
    /// Empty cache holding at most `budget_bytes` of values
    #[must_use]
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            budget_bytes,
            size_bytes: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached value, marking it most recently used
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Cached value, or the result of `load` which is then cached.
    ///
    /// A value larger than the whole budget is returned but not retained.
    pub fn get_or_load<E>(&mut self, key: K, load: impl FnOnce(&K) -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = load(&key)?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Insert a value, evicting least-recently-used entries to stay within budget
    pub fn insert(&mut self, key: K, value: V) {
        let size = value.size_in_bytes();
        if size > self.budget_bytes {
            tracing::debug!(size, budget = self.budget_bytes, "value exceeds cache budget; not retained");
            return;
        }
        if let Some(old) = self.entries.put(key, value) {
            self.size_bytes -= old.size_in_bytes();
        }
        self.size_bytes += size;
        while self.size_bytes > self.budget_bytes {
            let Some((_, evicted)) = self.entries.pop_lru() else {
                break;
            };
            let freed = evicted.size_in_bytes();
            self.size_bytes -= freed;
            tracing::debug!(freed, retained = self.size_bytes, "cache entry evicted");
        }
    }

    /// True if `key` is cached; does not touch recency
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently retained
    pub fn size_in_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Byte budget
    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that missed
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
