//! Cache abstractions for storing fetched data.
//!
//! This module provides a `Cache` trait and implementations for caching
//! downloaded bytes to reduce network requests. Every entry carries an
//! [`Expiry`]; an expired entry is never returned and is purged either
//! lazily when it is next read or by [`Cache::remove_expired`].
//!
//! # Implementations
//!
//! - [`MemoryCache`]: In-memory cache with optional entry-count and size limits
//! - [`DiskCache`]: Disk-based cache with a byte capacity
//! - [`TieredCache`]: A short-lived memory tier in front of a long-lived disk tier
//! - [`NoCache`]: Passthrough implementation that caches nothing

mod disk;
mod memory;
mod tiered;

use crate::error::Result;
use chrono::{DateTime, TimeDelta, Utc};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

pub(crate) use disk::{default_cache_root, write_atomic};
pub use disk::{DEFAULT_DISK_CAPACITY, DEFAULT_DISK_EXPIRY, DiskCache};
pub use memory::MemoryCache;
pub use tiered::{DEFAULT_MEMORY_ENTRIES, DEFAULT_MEMORY_EXPIRY, TieredCache};

/// Future type for cache get operations.
pub type GetFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;

/// Future type for cache put/remove operations.
pub type CacheFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Future type for cache lookups that also report the entry's expiry.
pub type EntryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<(Vec<u8>, Expiry)>>> + Send + 'a>>;

/// How long a cache entry stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The entry never expires.
    Never,
    /// The entry expires this long after it is stored.
    After(Duration),
    /// The entry expires at a fixed point in time.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Resolve this expiry to an absolute deadline, relative to `now`.
    ///
    /// Returns `None` for entries that never expire. Durations too large to
    /// represent are treated as never expiring.
    #[must_use]
    pub fn deadline(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::After(duration) => TimeDelta::from_std(duration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta)),
            Expiry::At(at) => Some(at),
        }
    }

    /// An expiry at `deadline`, or [`Expiry::Never`] without one.
    #[must_use]
    pub fn from_deadline(deadline: Option<DateTime<Utc>>) -> Expiry {
        deadline.map_or(Expiry::Never, Expiry::At)
    }

    /// The earlier of two expiries.
    #[must_use]
    pub fn min(self, other: Expiry) -> Expiry {
        let now = Utc::now();
        match (self.deadline(now), other.deadline(now)) {
            (None, None) => Expiry::Never,
            (Some(a), None) => Expiry::At(a),
            (None, Some(b)) => Expiry::At(b),
            (Some(a), Some(b)) => Expiry::At(a.min(b)),
        }
    }
}

/// Whether a deadline has passed.
pub(crate) fn is_expired(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    deadline.is_some_and(|deadline| deadline <= now)
}

/// A cache for storing fetched data.
///
/// The cache is keyed by request fingerprint and stores raw bytes.
/// Implementations may choose to store data in memory, on disk, or in any
/// other persistent storage, but must tolerate concurrent callers and must
/// never hand out a partially written value.
pub trait Cache: Send + Sync {
    /// Get data from the cache.
    ///
    /// Returns `Ok(Some(data))` if the data is cached and unexpired, `Ok(None)`
    /// if not, or an error if the cache operation failed.
    fn get(&self, key: &str) -> GetFuture<'_>;

    /// Get data together with the entry's expiry.
    ///
    /// The default reports [`Expiry::Never`]. Caches that track expiry
    /// override this so a faster tier never outlives the entry it copies.
    fn get_entry(&self, key: &str) -> EntryFuture<'_> {
        let get = self.get(key);
        Box::pin(async move { Ok(get.await?.map(|data| (data, Expiry::Never))) })
    }

    /// Store data in the cache, replacing any previous value for `key`.
    fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_>;

    /// Remove data from the cache.
    fn remove(&self, key: &str) -> CacheFuture<'_>;

    /// Remove every expired entry.
    fn remove_expired(&self) -> CacheFuture<'_>;

    /// Clear all cached data.
    fn clear(&self) -> CacheFuture<'_>;
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn get(&self, key: &str) -> GetFuture<'_> {
        (**self).get(key)
    }

    fn get_entry(&self, key: &str) -> EntryFuture<'_> {
        (**self).get_entry(key)
    }

    fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_> {
        (**self).put(key, data, expiry)
    }

    fn remove(&self, key: &str) -> CacheFuture<'_> {
        (**self).remove(key)
    }

    fn remove_expired(&self) -> CacheFuture<'_> {
        (**self).remove_expired()
    }

    fn clear(&self) -> CacheFuture<'_> {
        (**self).clear()
    }
}

/// A cache that stores nothing (passthrough).
///
/// This is useful when caching is not desired or for testing.
#[derive(Debug, Clone, Default)]
pub struct NoCache;

impl NoCache {
    /// Create a new no-op cache.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Cache for NoCache {
    fn get(&self, _key: &str) -> GetFuture<'_> {
        Box::pin(async { Ok(None) })
    }

    fn put(&self, _key: &str, _data: Vec<u8>, _expiry: Expiry) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, _key: &str) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn remove_expired(&self) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_cache() {
        let cache = NoCache::new();

        // Put should succeed but not store anything.
        cache
            .put("GET-http://example.com", vec![1, 2, 3], Expiry::Never)
            .await
            .unwrap();

        // Get should return None.
        let result = cache.get("GET-http://example.com").await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_expiry_deadline() {
        let now = Utc::now();
        assert_eq!(Expiry::Never.deadline(now), None);
        assert_eq!(
            Expiry::After(Duration::from_secs(60)).deadline(now),
            Some(now + TimeDelta::seconds(60))
        );
        assert_eq!(Expiry::At(now).deadline(now), Some(now));
        assert_eq!(Expiry::After(Duration::MAX).deadline(now), None);
    }

    #[test]
    fn test_expiry_min() {
        let now = Utc::now();
        let soon = now + TimeDelta::seconds(10);
        let later = now + TimeDelta::days(10);

        assert_eq!(Expiry::At(soon).min(Expiry::At(later)), Expiry::At(soon));
        assert_eq!(Expiry::Never.min(Expiry::At(later)), Expiry::At(later));
        assert_eq!(Expiry::Never.min(Expiry::Never), Expiry::Never);
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(!is_expired(None, now));
        assert!(is_expired(Some(now), now));
        assert!(is_expired(Some(now - TimeDelta::seconds(1)), now));
        assert!(!is_expired(Some(now + TimeDelta::seconds(1)), now));
    }
}
