use super::{Cache, CacheFuture, EntryFuture, Expiry, GetFuture, is_expired};
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// An in-memory cache.
///
/// This cache stores data in a `HashMap` protected by a `RwLock`. It's
/// suitable as a hot-path accelerator in front of a slower tier, or on its
/// own for short-lived applications.
///
/// The cache has optional limits on the number of entries and on the total
/// size in bytes. When either limit is exceeded, the oldest entries are
/// evicted.
#[derive(Debug)]
pub struct MemoryCache {
    data: Arc<RwLock<MemoryCacheInner>>,
    max_entries: Option<usize>,
    max_size: Option<usize>,
}

#[derive(Debug)]
struct MemoryEntry {
    data: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, MemoryEntry>,
    /// Insertion order for eviction.
    order: VecDeque<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.current_size -= entry.data.len();
            self.order.retain(|k| k != key);
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(oldest) = self.order.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&oldest) {
            self.current_size -= entry.data.len();
        }
        true
    }
}

impl MemoryCache {
    /// Create a new memory cache with no limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_entries: None,
            max_size: None,
        }
    }

    /// Create a new memory cache holding at most `max_entries` entries.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Self::new()
        }
    }

    /// Create a new memory cache with a maximum size in bytes.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            ..Self::new()
        }
    }

    /// Get the current size of cached data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().current_size
    }

    /// Get the number of cached entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The unexpired entry for `key`, purging it if it has expired.
    fn lookup(&self, key: &str) -> Option<(Vec<u8>, Option<DateTime<Utc>>)> {
        let now = Utc::now();
        let (result, expired) = {
            let cache = self.read();
            match cache.entries.get(key) {
                Some(entry) if is_expired(entry.expires_at, now) => (None, true),
                Some(entry) => (Some((entry.data.clone(), entry.expires_at)), false),
                None => (None, false),
            }
        };

        if expired {
            let mut cache = self.write();
            // Re-check under the write lock; a writer may have replaced it.
            if cache
                .entries
                .get(key)
                .is_some_and(|entry| is_expired(entry.expires_at, now))
            {
                cache.remove_entry(key);
            }
        }

        result
    }

    // Poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, MemoryCacheInner> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryCacheInner> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCache {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            max_entries: self.max_entries,
            max_size: self.max_size,
        }
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> GetFuture<'_> {
        let result = self.lookup(key).map(|(data, _)| data);
        Box::pin(async move { Ok(result) })
    }

    fn get_entry(&self, key: &str) -> EntryFuture<'_> {
        let result = self
            .lookup(key)
            .map(|(data, expires_at)| (data, Expiry::from_deadline(expires_at)));
        Box::pin(async move { Ok(result) })
    }

    fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_> {
        let key = key.to_string();
        let expires_at = expiry.deadline(Utc::now());
        let mut cache = self.write();

        // If the entry already exists, remove it first.
        cache.remove_entry(&key);

        let data_size = data.len();

        // Evict old entries if we have limits.
        if let Some(max_size) = self.max_size {
            while cache.current_size + data_size > max_size && cache.evict_oldest() {}
        }
        if let Some(max_entries) = self.max_entries {
            while cache.entries.len() >= max_entries && cache.evict_oldest() {}
        }

        cache
            .entries
            .insert(key.clone(), MemoryEntry { data, expires_at });
        cache.order.push_back(key);
        cache.current_size += data_size;

        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> CacheFuture<'_> {
        self.write().remove_entry(key);
        Box::pin(async { Ok(()) })
    }

    fn remove_expired(&self) -> CacheFuture<'_> {
        let now = Utc::now();
        let mut cache = self.write();
        let expired: Vec<String> = cache
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(entry.expires_at, now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.remove_entry(key);
        }
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        let mut cache = self.write();
        cache.entries.clear();
        cache.order.clear();
        cache.current_size = 0;
        Box::pin(async { Ok(()) })
    }
}
