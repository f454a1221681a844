use super::{Cache, CacheFuture, DiskCache, EntryFuture, Expiry, GetFuture, MemoryCache};
use std::time::Duration;
use tracing::{debug, warn};

/// Default lifetime of an entry in the memory tier.
pub const DEFAULT_MEMORY_EXPIRY: Duration = Duration::from_secs(2 * 60);

/// Default number of entries kept in the memory tier.
pub const DEFAULT_MEMORY_ENTRIES: usize = 64;

/// A two-tier cache: a short-lived memory tier in front of a long-lived one.
///
/// Reads try memory first and fall back to the slow tier, promoting hits.
/// Writes go to both tiers. A memory copy never outlives `memory_ttl`, nor
/// the slow-tier entry it was copied from.
#[derive(Debug)]
pub struct TieredCache<M: Cache = MemoryCache, D: Cache = DiskCache> {
    memory: M,
    disk: D,
    memory_ttl: Duration,
}

impl TieredCache {
    /// Memory tier with default bounds in front of `disk`.
    #[must_use]
    pub fn with_disk(disk: DiskCache) -> Self {
        Self::new(
            MemoryCache::with_max_entries(DEFAULT_MEMORY_ENTRIES),
            disk,
            DEFAULT_MEMORY_EXPIRY,
        )
    }
}

impl<M: Cache, D: Cache> TieredCache<M, D> {
    /// Combine two tiers.
    #[must_use]
    pub fn new(memory: M, disk: D, memory_ttl: Duration) -> Self {
        Self {
            memory,
            disk,
            memory_ttl,
        }
    }

    /// The fast tier.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// The slow tier.
    pub fn disk(&self) -> &D {
        &self.disk
    }

    fn memory_expiry(&self, expiry: Expiry) -> Expiry {
        expiry.min(Expiry::After(self.memory_ttl))
    }
}

impl<M: Cache, D: Cache> Cache for TieredCache<M, D> {
    fn get(&self, key: &str) -> GetFuture<'_> {
        let entry = self.get_entry(key);
        Box::pin(async move { Ok(entry.await?.map(|(data, _)| data)) })
    }

    fn get_entry(&self, key: &str) -> EntryFuture<'_> {
        let key = key.to_string();
        Box::pin(async move {
            match self.memory.get_entry(&key).await {
                Ok(Some(entry)) => return Ok(Some(entry)),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "memory tier read failed"),
            }

            let Some((data, expiry)) = self.disk.get_entry(&key).await? else {
                return Ok(None);
            };

            debug!(key, "promoting disk entry to memory");
            if let Err(e) = self
                .memory
                .put(&key, data.clone(), self.memory_expiry(expiry))
                .await
            {
                warn!(key, error = %e, "memory tier promotion failed");
            }
            Ok(Some((data, expiry)))
        })
    }

    fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_> {
        let key = key.to_string();
        Box::pin(async move {
            self.memory
                .put(&key, data.clone(), self.memory_expiry(expiry))
                .await?;
            self.disk.put(&key, data, expiry).await
        })
    }

    fn remove(&self, key: &str) -> CacheFuture<'_> {
        let key = key.to_string();
        Box::pin(async move {
            self.memory.remove(&key).await?;
            self.disk.remove(&key).await
        })
    }

    fn remove_expired(&self) -> CacheFuture<'_> {
        Box::pin(async move {
            self.memory.remove_expired().await?;
            self.disk.remove_expired().await
        })
    }

    fn clear(&self) -> CacheFuture<'_> {
        Box::pin(async move {
            self.memory.clear().await?;
            self.disk.clear().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoCache;
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn test_tiered_writes_both_tiers() {
        let temp = tempfile::tempdir().unwrap();
        let cache = TieredCache::with_disk(DiskCache::new(temp.path()));

        cache.put("k", vec![1, 2], Expiry::Never).await.unwrap();

        assert_eq!(cache.memory().get("k").await.unwrap(), Some(vec![1, 2]));
        assert_eq!(cache.disk().get("k").await.unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_tiered_promotes_disk_hits() {
        let temp = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(temp.path());
        disk.put("k", vec![7], Expiry::Never).await.unwrap();

        let cache = TieredCache::with_disk(disk);
        assert!(cache.memory().is_empty());

        assert_eq!(cache.get("k").await.unwrap(), Some(vec![7]));
        assert_eq!(cache.memory().get("k").await.unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_tiered_promotion_keeps_disk_deadline() {
        let temp = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(temp.path());
        let deadline = Utc::now() + TimeDelta::seconds(30);
        disk.put("k", vec![7], Expiry::At(deadline)).await.unwrap();

        let cache = TieredCache::with_disk(disk);
        assert_eq!(
            cache.get_entry("k").await.unwrap(),
            Some((vec![7], Expiry::At(deadline)))
        );
        assert_eq!(
            cache.memory().get_entry("k").await.unwrap(),
            Some((vec![7], Expiry::At(deadline)))
        );
    }

    #[tokio::test]
    async fn test_tiered_promoted_copy_expires_with_disk_entry() {
        let temp = tempfile::tempdir().unwrap();
        let disk = DiskCache::new(temp.path());
        disk.put("k", vec![7], Expiry::After(Duration::from_millis(300)))
            .await
            .unwrap();

        let cache = TieredCache::with_disk(disk);
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![7]));
        assert_eq!(cache.memory().len(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(cache.disk().get("k").await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tiered_memory_copy_expires_first() {
        let cache = TieredCache::new(MemoryCache::new(), MemoryCache::new(), Duration::ZERO);

        cache.put("k", vec![3], Expiry::Never).await.unwrap();

        // The memory copy is already stale, the slow tier still answers.
        assert_eq!(cache.memory().get("k").await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap(), Some(vec![3]));
    }

    #[tokio::test]
    async fn test_tiered_clear() {
        let temp = tempfile::tempdir().unwrap();
        let cache = TieredCache::with_disk(DiskCache::new(temp.path()));

        cache.put("k", vec![1], Expiry::Never).await.unwrap();
        cache.clear().await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tiered_over_no_cache() {
        let cache = TieredCache::new(NoCache, NoCache, DEFAULT_MEMORY_EXPIRY);
        cache.put("k", vec![1], Expiry::Never).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
