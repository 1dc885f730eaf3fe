//! HTTP transport seam and its reqwest implementation.

use crate::settings::{AccessToken, ResolvedConfig};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::fmt;
use std::time::Duration;

const TRACING_TARGET: &str = "deploy::http";

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Canonical reason phrase for `status` (empty when unknown).
    pub reason: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            status,
            reason,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request did not yield an HTTP response (DNS, TLS, timeout, reset).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Authenticated JSON requests against the API. `path` is relative to the API base URL.
#[async_trait::async_trait]
pub trait DeploymentTransport: Send + Sync {
    async fn post_json(&self, path: &str, body: &[u8]) -> Result<RawResponse, TransportError>;

    async fn get_json(&self, path: &str) -> Result<RawResponse, TransportError>;
}

/// [`DeploymentTransport`] over a `reqwest::Client`.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new(
        base_url: &str,
        token: &AccessToken,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        Self::with_builder(reqwest::Client::builder(), base_url, token, timeout)
    }

    /// Like [`ReqwestTransport::new`], starting from a caller-tuned client builder (proxy, TLS).
    pub fn with_builder(
        builder: reqwest::ClientBuilder,
        base_url: &str,
        token: &AccessToken,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("token {}", token.expose()))
            .map_err(|_| TransportError("access token contains invalid header characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = builder.default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError(format!("failed to build HTTP client: {e}")))?;

        tracing::debug!(target: TRACING_TARGET, base_url = %base_url, "HTTP transport ready");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, TransportError> {
        Self::new(&config.api_url, &config.token, config.timeout)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
        url: &str,
    ) -> Result<RawResponse, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        tracing::info!(target: TRACING_TARGET, %method, url = %url, status = status.as_u16(), "Request completed");

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body: bytes.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl DeploymentTransport for ReqwestTransport {
    async fn post_json(&self, path: &str, body: &[u8]) -> Result<RawResponse, TransportError> {
        let url = self.url_for(path);
        let request = self.http.post(&url).body(body.to_vec());
        self.execute(request, "POST", &url).await
    }

    async fn get_json(&self, path: &str) -> Result<RawResponse, TransportError> {
        let url = self.url_for(path);
        let request = self.http.get(&url);
        self.execute(request, "GET", &url).await
    }
}
