//! HTTP client for the Poly asset catalog.
//!
//! This module provides the main `Client` type for looking up and listing
//! assets. Downloading an asset's files is implemented in
//! [`download`](crate::download).

use crate::cache::{Cache, DiskCache, Expiry, NoCache, TieredCache};
use crate::error::{Error, Result};
use crate::fetch::{CachePolicy, FetchRequest};
use crate::session::{Session, SessionConfig, SessionState};
use crate::store::FileStore;
use crate::types::{Asset, AssetPage, ListQuery, asset_id};
use poly_wire as wire;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Client for the Poly asset catalog.
///
/// The client owns its [`Session`] (credentials, transport, cancellation
/// scope), a shared cache for downloaded files and the [`FileStore`] those
/// files are written to. Cloning a client is cheap; clones share all three.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(SessionConfig::from_env())?;
/// let asset = client.get_asset("5vbJ5vildOq").await?;
/// let files = client.download_asset(&asset, DownloadOptions::default()).await?;
/// ```
pub struct Client<C: Cache = NoCache> {
    pub(crate) session: Arc<Session>,
    pub(crate) cache: Arc<C>,
    pub(crate) store: FileStore,
}

impl Client<NoCache> {
    /// Create a new client with no caching.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_cache(config, NoCache)
    }
}

impl Client<TieredCache> {
    /// Create a client with a memory tier in front of a disk cache in the
    /// platform cache directory.
    pub fn with_default_cache(config: SessionConfig) -> Result<Self> {
        let disk = DiskCache::in_default_location()?;
        Self::with_cache(config, TieredCache::with_disk(disk))
    }
}

impl<C: Cache> Client<C> {
    /// Create a new client with a custom cache.
    pub fn with_cache(config: SessionConfig, cache: C) -> Result<Self> {
        Ok(Self::with_session_and_cache(
            Session::new(config)?,
            cache,
            FileStore::in_default_location()?,
        ))
    }

    /// Create a new client from its parts.
    #[must_use]
    pub fn with_session_and_cache(session: Session, cache: C, store: FileStore) -> Self {
        Self {
            session: Arc::new(session),
            cache: Arc::new(cache),
            store,
        }
    }

    /// Write downloaded files to `store`.
    #[must_use]
    pub fn with_store(mut self, store: FileStore) -> Self {
        self.store = store;
        self
    }

    /// The session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The download cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Where downloaded files are written.
    #[must_use]
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.session.is_authorized()
    }

    /// Replace the API key. Requests already in flight keep the old one.
    pub fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        self.session.set_api_key(api_key)
    }

    /// Replace the OAuth token. Requests already in flight keep the old one.
    pub fn set_auth_token(&self, auth_token: Option<String>) -> Result<()> {
        self.session.set_auth_token(auth_token)
    }

    /// Forget all credentials and empty the cache.
    pub async fn reset(&self) -> Result<()> {
        self.session.reset()?;
        self.cache.clear().await
    }

    /// Cancel every request and download started so far.
    pub fn cancel_all(&self) {
        self.session.cancel_all();
    }

    /// Fetch a single asset.
    ///
    /// `id` may be a bare identifier or a full `assets/<id>` resource name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthorized`] without touching the network if no
    /// API key is configured, [`Error::Json`] if the response is not an
    /// asset document, and [`Error::InvalidData`] if it lacks a name.
    pub async fn get_asset(&self, id: &str) -> Result<Asset> {
        let state = self.session.snapshot();
        let key = api_key(&state)?;

        let id = asset_id(id.trim());
        if id.is_empty() {
            return Err(Error::invalid("asset id", "empty"));
        }

        let mut url = Url::parse(&format!(
            "{}/v1/assets/{}",
            state.config().base_url,
            urlencoding::encode(id)
        ))?;
        url.query_pairs_mut().append_pair("key", key);

        let body = self.fetch_catalog(&state, &url).await?;
        let asset: wire::Asset = serde_json::from_slice(&body).map_err(|e| Error::Json {
            context: "asset",
            message: e.to_string(),
        })?;
        Asset::try_from(asset)
    }

    /// List assets matching `query`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::get_asset`].
    pub async fn list_assets(&self, query: &ListQuery) -> Result<AssetPage> {
        let state = self.session.snapshot();
        let key = api_key(&state)?;

        let mut url = Url::parse(&format!("{}/v1/assets", state.config().base_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", key);
            for (name, value) in query.params() {
                pairs.append_pair(name, &value);
            }
        }

        let body = self.fetch_catalog(&state, &url).await?;
        let response: wire::ListAssetsResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Json {
                context: "asset list",
                message: e.to_string(),
            })?;
        AssetPage::try_from(response)
    }

    /// Catalog responses always come from the network and are not cached.
    async fn fetch_catalog(&self, state: &SessionState, url: &Url) -> Result<Vec<u8>> {
        tracing::debug!(path = url.path(), "querying catalog");
        FetchRequest::new(url.as_str(), CachePolicy::IgnoreCache)
            .with_cancellation(self.request_token())
            .fetch(&NoCache, state.transport().as_ref(), Expiry::Never)
            .await
    }

    pub(crate) fn request_token(&self) -> CancellationToken {
        self.session.request_token()
    }
}

impl<C: Cache> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            cache: Arc::clone(&self.cache),
            store: self.store.clone(),
        }
    }
}

impl<C: Cache> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn api_key(state: &SessionState) -> Result<&str> {
    state
        .config()
        .api_key
        .as_deref()
        .ok_or(Error::NotAuthorized)
}
