//! Network transport for byte transfers.
//!
//! The orchestration layer only needs "fetch this URL to bytes"; the
//! [`Transport`] trait captures exactly that so the HTTP stack can be swapped
//! out (or faked in tests).

use crate::error::{Error, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

/// Receives transfer progress as a fraction in `0.0..=1.0`.
pub type ProgressHandler = Arc<dyn Fn(f32) + Send + Sync>;

/// Future type for transport operations.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Fetches the body of a URL.
pub trait Transport: Send + Sync {
    /// Perform a GET request for `url`, returning the full body.
    ///
    /// If `progress` is set, it is called as the body arrives.
    fn get<'a>(&'a self, url: &'a str, progress: Option<ProgressHandler>) -> TransportFuture<'a>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn get<'a>(&'a self, url: &'a str, progress: Option<ProgressHandler>) -> TransportFuture<'a> {
        (**self).get(url, progress)
    }
}

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(200);

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("poly/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given timeout, user agent and optional
    /// bearer token sent on every request.
    pub fn new(timeout: Duration, user_agent: &str, auth_token: Option<&str>) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| Error::invalid("user agent", e.to_string()))?,
        );
        if let Some(token) = auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::invalid("auth token", e.to_string()))?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| Error::Unknown {
                detail: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { http })
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, url: &'a str, progress: Option<ProgressHandler>) -> TransportFuture<'a> {
        Box::pin(async move {
            tracing::debug!(url, "fetching");

            let mut response = self.http.get(url).send().await.map_err(|e| Error::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(Error::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let total = response.content_length();
            let mut data = Vec::with_capacity(
                total.and_then(|t| usize::try_from(t).ok()).unwrap_or(0),
            );

            while let Some(chunk) = response.chunk().await.map_err(|e| Error::Http {
                url: url.to_string(),
                message: e.to_string(),
            })? {
                data.extend_from_slice(&chunk);
                if let (Some(progress), Some(total)) = (&progress, total) {
                    progress(fraction(data.len() as u64, total));
                }
            }

            if let Some(progress) = &progress {
                progress(1.0);
            }

            tracing::debug!(url, size = data.len(), "fetched");
            Ok(data)
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn fraction(received: u64, total: u64) -> f32 {
    if total == 0 {
        return 1.0;
    }
    (received as f64 / total as f64).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path},
    };

    #[test]
    fn test_fraction() {
        assert!((fraction(0, 10) - 0.0).abs() < f32::EPSILON);
        assert!((fraction(5, 10) - 0.5).abs() < f32::EPSILON);
        assert!((fraction(20, 10) - 1.0).abs() < f32::EPSILON);
        assert!((fraction(0, 0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rejects_invalid_token() {
        let result = HttpTransport::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, Some("bad\ntoken"));
        assert!(matches!(result, Err(Error::InvalidData { .. })));
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.obj"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v 0 0 0".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, Some("secret")).unwrap();
        let url = format!("{}/a.obj", server.uri());
        let data = transport.get(&url, None).await.unwrap();
        assert_eq!(data, b"v 0 0 0");
    }

    #[tokio::test]
    async fn test_get_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64 * 1024]))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |p| seen.lock().unwrap().push(p))
        };

        let transport = HttpTransport::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, None).unwrap();
        let url = format!("{}/big.bin", server.uri());
        let data = transport.get(&url, Some(progress)).await.unwrap();
        assert_eq!(data.len(), 64 * 1024);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!((seen.last().copied().unwrap() - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_get_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, None).unwrap();
        let url = format!("{}/missing", server.uri());
        let err = transport.get(&url, None).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_get_maps_connection_failure() {
        let transport = HttpTransport::new(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT, None).unwrap();
        // Nothing listens on port 9 locally.
        let err = transport.get("http://127.0.0.1:9/x", None).await.unwrap_err();
        assert!(matches!(err, Error::Http { .. }));
    }
}
