//! Single byte-fetches resolved through the cache.
//!
//! A [`FetchRequest`] is one logical transfer of a URL. Its [`CachePolicy`]
//! decides whether the cache, the network, or both are consulted.

use crate::cache::{Cache, Expiry};
use crate::error::{Error, Result};
use crate::transport::{ProgressHandler, Transport};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// HTTP method used for every byte fetch.
const FETCH_METHOD: &str = "GET";

/// How a fetch uses the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Use cached bytes when present and unexpired, otherwise fetch and
    /// store the result.
    #[default]
    PreferCache,
    /// Always fetch, then replace the cached value.
    IgnoreCache,
    /// Never touch the network; a miss is an error.
    CacheOnly,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CachePolicy::PreferCache => "prefer-cache",
            CachePolicy::IgnoreCache => "ignore-cache",
            CachePolicy::CacheOnly => "cache-only",
        })
    }
}

/// Cache key for a request: `"<METHOD>-<URL>"`.
///
/// Without a method, the hex SHA-256 of the URL is used instead.
#[must_use]
pub fn fingerprint(method: Option<&str>, url: &str) -> String {
    match method {
        Some(method) => format!("{method}-{url}"),
        None => hex::encode(Sha256::digest(url.as_bytes())),
    }
}

/// One logical fetch of a URL.
#[derive(Clone)]
pub struct FetchRequest {
    url: String,
    policy: CachePolicy,
    progress: Option<ProgressHandler>,
    cancel: CancellationToken,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl FetchRequest {
    /// Create a request for `url` under `policy`.
    #[must_use]
    pub fn new(url: impl Into<String>, policy: CachePolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Report network progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cancel this request when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The URL being fetched.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The cache policy.
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// The cache key for this request.
    #[must_use]
    pub fn key(&self) -> String {
        fingerprint(Some(FETCH_METHOD), &self.url)
    }

    /// A token that cancels this request.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the request. A pending [`fetch`](Self::fetch) settles with
    /// [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolve the request.
    ///
    /// Network results are stored in `cache` with `expiry`. Cache failures
    /// are logged and treated as a miss; they never fail the fetch.
    ///
    /// Cancelling while the cache is read or the network is in use settles
    /// the request with [`Error::Cancelled`].
    pub async fn fetch<C, T>(&self, cache: &C, transport: &T, expiry: Expiry) -> Result<Vec<u8>>
    where
        C: Cache + ?Sized,
        T: Transport + ?Sized,
    {
        let url = self.url.as_str();
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }

        let key = self.key();

        if self.policy != CachePolicy::IgnoreCache {
            match self.until_cancelled(cache.get(&key)).await? {
                Ok(Some(data)) => {
                    debug!(url, "cache hit");
                    return Ok(data);
                }
                Ok(None) => {}
                Err(e) => warn!(url, error = %e, "cache read failed"),
            }
        }

        if self.policy == CachePolicy::CacheOnly {
            return Err(Error::NotCached { key });
        }

        let data = self
            .until_cancelled(transport.get(url, self.progress.clone()))
            .await??;

        if let Err(e) = cache.put(&key, data.clone(), expiry).await {
            warn!(url, error = %e, "cache write failed");
        }

        Ok(data)
    }

    async fn until_cancelled<F: Future>(&self, future: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(url = self.url.as_str(), "fetch cancelled");
                Err(self.cancelled())
            }
            output = future => Ok(output),
        }
    }

    fn cancelled(&self) -> Error {
        Error::Cancelled {
            url: self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheFuture, GetFuture, MemoryCache, NoCache};
    use crate::error::ErrorKind;
    use crate::transport::TransportFuture;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use std::time::Duration;

    /// Serves a fixed body and counts calls.
    #[derive(Default)]
    struct FakeTransport {
        body: Vec<u8>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeTransport {
        fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for FakeTransport {
        fn get<'a>(
            &'a self,
            _url: &'a str,
            progress: Option<ProgressHandler>,
        ) -> TransportFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(progress) = progress {
                    progress(0.5);
                    progress(1.0);
                }
                Ok(self.body.clone())
            })
        }
    }

    /// A cache whose every operation fails.
    struct BrokenCache;

    impl Cache for BrokenCache {
        fn get(&self, _key: &str) -> GetFuture<'_> {
            Box::pin(async { Err(broken()) })
        }
        fn put(&self, _key: &str, _data: Vec<u8>, _expiry: Expiry) -> CacheFuture<'_> {
            Box::pin(async { Err(broken()) })
        }
        fn remove(&self, _key: &str) -> CacheFuture<'_> {
            Box::pin(async { Err(broken()) })
        }
        fn remove_expired(&self) -> CacheFuture<'_> {
            Box::pin(async { Err(broken()) })
        }
        fn clear(&self) -> CacheFuture<'_> {
            Box::pin(async { Err(broken()) })
        }
    }

    fn broken() -> Error {
        Error::Cache {
            operation: "test",
            message: "broken".to_string(),
        }
    }

    const URL: &str = "https://example.com/a.obj";

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint(Some("GET"), URL), "GET-https://example.com/a.obj");
        let hashed = fingerprint(None, URL);
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, fingerprint(None, URL));
        assert_ne!(hashed, fingerprint(None, "https://example.com/b.obj"));
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(CachePolicy::default(), CachePolicy::PreferCache);
        assert_eq!(CachePolicy::CacheOnly.to_string(), "cache-only");
    }

    #[tokio::test]
    async fn test_prefer_cache_fetches_then_hits() {
        let cache = MemoryCache::new();
        let transport = FakeTransport::new(b"abc");
        let request = FetchRequest::new(URL, CachePolicy::PreferCache);

        let first = request.fetch(&cache, &transport, Expiry::Never).await.unwrap();
        let second = request.fetch(&cache, &transport, Expiry::Never).await.unwrap();

        assert_eq!(first, b"abc");
        assert_eq!(second, b"abc");
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            cache.get("GET-https://example.com/a.obj").await.unwrap(),
            Some(b"abc".to_vec())
        );
    }

    #[tokio::test]
    async fn test_ignore_cache_always_fetches_and_replaces() {
        let cache = MemoryCache::new();
        cache
            .put(&fingerprint(Some("GET"), URL), b"old".to_vec(), Expiry::Never)
            .await
            .unwrap();
        let transport = FakeTransport::new(b"new");

        let request = FetchRequest::new(URL, CachePolicy::IgnoreCache);
        let data = request.fetch(&cache, &transport, Expiry::Never).await.unwrap();

        assert_eq!(data, b"new");
        assert_eq!(transport.calls(), 1);
        assert_eq!(cache.get(&request.key()).await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_cache_only_miss_is_invalid_input() {
        let cache = MemoryCache::new();
        let transport = FakeTransport::new(b"abc");

        let err = FetchRequest::new(URL, CachePolicy::CacheOnly)
            .fetch(&cache, &transport, Expiry::Never)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotCached { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_only_hit() {
        let cache = MemoryCache::new();
        let request = FetchRequest::new(URL, CachePolicy::CacheOnly);
        cache
            .put(&request.key(), b"cached".to_vec(), Expiry::Never)
            .await
            .unwrap();
        let transport = FakeTransport::new(b"abc");

        let data = request.fetch(&cache, &transport, Expiry::Never).await.unwrap();
        assert_eq!(data, b"cached");
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_progress_only_on_network() {
        let cache = MemoryCache::new();
        let transport = FakeTransport::new(b"abc");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p| seen.lock().unwrap().push(p))
        };
        let request = FetchRequest::new(URL, CachePolicy::PreferCache).with_progress(progress);

        request.fetch(&cache, &transport, Expiry::Never).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);

        // Cache hit: no further progress.
        request.fetch(&cache, &transport, Expiry::Never).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let transport = FakeTransport::new(b"abc");
        let request = FetchRequest::new(URL, CachePolicy::PreferCache);
        request.cancel();

        let err = request
            .fetch(&NoCache, &transport, Expiry::Never)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let cache = MemoryCache::new();
        let transport = FakeTransport {
            delay: Some(Duration::from_secs(30)),
            ..FakeTransport::new(b"abc")
        };
        let request = FetchRequest::new(URL, CachePolicy::PreferCache);

        let token = request.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = request.fetch(&cache, &transport, Expiry::Never).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(cache.is_empty());
    }

    /// A cache whose reads take a long time.
    struct SlowCache {
        inner: MemoryCache,
        delay: Duration,
    }

    impl Cache for SlowCache {
        fn get(&self, key: &str) -> GetFuture<'_> {
            let key = key.to_string();
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.inner.get(&key).await
            })
        }
        fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_> {
            self.inner.put(key, data, expiry)
        }
        fn remove(&self, key: &str) -> CacheFuture<'_> {
            self.inner.remove(key)
        }
        fn remove_expired(&self) -> CacheFuture<'_> {
            self.inner.remove_expired()
        }
        fn clear(&self) -> CacheFuture<'_> {
            self.inner.clear()
        }
    }

    #[tokio::test]
    async fn test_cancel_during_cache_read() {
        let cache = SlowCache {
            inner: MemoryCache::new(),
            delay: Duration::from_secs(30),
        };
        let request = FetchRequest::new(URL, CachePolicy::CacheOnly);
        cache
            .put(&request.key(), b"cached".to_vec(), Expiry::Never)
            .await
            .unwrap();
        let transport = FakeTransport::new(b"abc");

        let token = request.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            request.fetch(&cache, &transport, Expiry::Never),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_failures_are_swallowed() {
        let transport = FakeTransport::new(b"abc");
        let data = FetchRequest::new(URL, CachePolicy::PreferCache)
            .fetch(&BrokenCache, &transport, Expiry::Never)
            .await
            .unwrap();
        assert_eq!(data, b"abc");
        assert_eq!(transport.calls(), 1);
    }
}
