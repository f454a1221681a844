//! Session configuration shared by every request a client makes.
//!
//! A [`Session`] hands out immutable [`SessionState`] snapshots. Requests take
//! one when they start and keep it until they settle, so changing
//! credentials never affects (or cancels) a request already in flight.

use crate::cache::DEFAULT_DISK_EXPIRY;
use crate::error::Result;
use crate::transport::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, HttpTransport, Transport};
use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

/// Default catalog endpoint.
pub const DEFAULT_BASE_URL: &str = "https://poly.googleapis.com";

/// Client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Catalog endpoint, without a trailing slash.
    pub base_url: String,
    /// API key sent as the `key` query parameter. Catalog calls require one.
    pub api_key: Option<String>,
    /// OAuth token sent as `Authorization: Bearer` on every request.
    pub auth_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Lifetime of downloaded files in the cache.
    pub cache_expiry: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
            cache_expiry: DEFAULT_DISK_EXPIRY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("cache_expiry", &self.cache_expiry)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `POLY_API_KEY` | API key |
    /// | `POLY_AUTH_TOKEN` | OAuth bearer token |
    /// | `POLY_BASE_URL` | Catalog endpoint |
    /// | `POLY_TIMEOUT_SECS` | Request timeout in seconds |
    ///
    /// Unset or unparseable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POLY_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("POLY_API_KEY").ok().filter(|key| !key.is_empty()),
            auth_token: std::env::var("POLY_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            timeout: std::env::var("POLY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
            ..defaults
        }
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the OAuth bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    /// Set the catalog endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long downloaded files stay cached.
    #[must_use]
    pub fn with_cache_expiry(mut self, cache_expiry: Duration) -> Self {
        self.cache_expiry = cache_expiry;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// An immutable view of the session taken when a request starts.
pub struct SessionState {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
}

impl SessionState {
    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transport built for this configuration.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Credentials, transport and the cancellation scope for a client.
pub struct Session {
    state: RwLock<Arc<SessionState>>,
    /// Parent of every request token; replaced after [`Session::cancel_all`].
    cancel: Mutex<CancellationToken>,
    /// A caller-supplied transport, kept across credential changes.
    fixed_transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session that talks HTTP with `reqwest`.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let transport = build_transport(&config)?;
        Ok(Self::from_parts(config, transport, None))
    }

    /// Create a session that sends every transfer through `transport`.
    ///
    /// Credential changes update the configuration but keep this transport.
    #[must_use]
    pub fn with_transport(config: SessionConfig, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(config, Arc::clone(&transport), Some(transport))
    }

    fn from_parts(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        fixed_transport: Option<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            state: RwLock::new(Arc::new(SessionState { config, transport })),
            cancel: Mutex::new(CancellationToken::new()),
            fixed_transport,
        }
    }

    /// The current state. Hold on to it for the lifetime of one request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SessionState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// A copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.snapshot().config.clone()
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.snapshot().config.api_key.is_some()
    }

    /// Replace the API key.
    pub fn set_api_key(&self, api_key: Option<String>) -> Result<()> {
        self.update(|config| config.api_key = api_key)
    }

    /// Replace the OAuth token. This rebuilds the HTTP transport.
    pub fn set_auth_token(&self, auth_token: Option<String>) -> Result<()> {
        self.update(|config| config.auth_token = auth_token)
    }

    /// Drop all credentials.
    pub fn reset(&self) -> Result<()> {
        self.update(|config| {
            config.api_key = None;
            config.auth_token = None;
        })
    }

    /// Apply a configuration change and publish a new snapshot.
    ///
    /// Updates are serialised, so concurrent changes to different fields
    /// are all kept.
    pub fn update(&self, change: impl FnOnce(&mut SessionConfig)) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut config = state.config.clone();
        change(&mut config);

        let transport = match &self.fixed_transport {
            Some(transport) => Arc::clone(transport),
            None => build_transport(&config)?,
        };

        *state = Arc::new(SessionState { config, transport });
        tracing::debug!("session configuration updated");
        Ok(())
    }

    /// A token for one request, cancelled by [`Session::cancel_all`].
    #[must_use]
    pub fn request_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token()
    }

    /// Cancel every request started from this session so far.
    ///
    /// Requests started afterwards are unaffected.
    pub fn cancel_all(&self) {
        let previous = std::mem::replace(
            &mut *self.cancel.lock().unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        previous.cancel();
        tracing::debug!("cancelled all in-flight requests");
    }
}

fn build_transport(config: &SessionConfig) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(HttpTransport::new(
        config.timeout,
        &config.user_agent,
        config.auth_token.as_deref(),
    )?))
}
