//! Session-scoped cache with TTL and LRU eviction.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// A TTL + LRU cache shared by the tools of one session.
///
/// Cloning shares the underlying storage. Lock poisoning is treated as an
/// empty cache rather than a panic.
pub struct SessionCache<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
}

impl<V> Clone for SessionCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> std::fmt::Debug for SessionCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("len", &self.len())
            .finish()
    }
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    max_entries: usize,
    ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl<V: Clone> SessionCache<V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                max_entries,
                ttl,
            })),
        }
    }

    /// Get a cached value by key, returning None if expired or missing.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().ok()?;
        let ttl = inner.ttl;

        let expired = inner.entries.get(key).map(|e| e.inserted_at.elapsed() > ttl)?;
        if expired {
            inner.entries.remove(key);
            return None;
        }
        let entry = inner.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        Some(entry.value.clone())
    }

    /// Insert a value, evicting expired entries and then the LRU entry if at capacity.
    pub fn insert(&self, key: String, value: V) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };
        if inner.max_entries == 0 {
            return;
        }

        let ttl = inner.ttl;
        inner.entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);

        if inner.entries.len() >= inner.max_entries && !inner.entries.contains_key(&key) {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
            }
        }

        let now = Instant::now();
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed: now,
            },
        );
    }

    /// Remove one entry.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner
            .write()
            .ok()?
            .entries
            .remove(key)
            .map(|entry| entry.value)
    }

    /// Clear all entries.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.clear();
        }
    }
}

impl<V> SessionCache<V> {
    /// Current number of entries, including ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
