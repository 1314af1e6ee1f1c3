//! A [`Facilitator`] reached over HTTP.
//!
//! ```rust
//! use x402_axum::facilitator_client::FacilitatorClient;
//!
//! let facilitator = FacilitatorClient::try_from("https://x402.org/facilitator").unwrap();
//! assert_eq!(facilitator.verify_url().as_str(), "https://x402.org/facilitator/verify");
//! ```
//!
//! Each call is bounded by [`FacilitatorClient::DEFAULT_TIMEOUT`] unless
//! configured otherwise. Failures carry the [`Endpoint`] they came from and
//! classify themselves as a [`FacilitatorFailure`], which the gate turns into
//! a `503`.

use http::{HeaderMap, StatusCode};
use reqwest::{Client, RequestBuilder};
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;
use x402_types::facilitator::{Facilitator, FacilitatorError, FacilitatorFailure};
use x402_types::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// The three facilitator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Verify,
    Settle,
    Supported,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::Verify => "./verify",
            Endpoint::Settle => "./settle",
            Endpoint::Supported => "./supported",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Verify => f.write_str("POST /verify"),
            Endpoint::Settle => f.write_str("POST /settle"),
            Endpoint::Supported => f.write_str("GET /supported"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("Invalid facilitator URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    /// Connection failures and timeouts.
    #[error("{endpoint} failed: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: StatusCode,
        body: String,
    },
    #[error("{endpoint} returned an undecodable body: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
}

impl FacilitatorClientError {
    /// The call that failed, `None` when the client could not be built.
    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            FacilitatorClientError::InvalidUrl { .. } => None,
            FacilitatorClientError::Transport { endpoint, .. }
            | FacilitatorClientError::Status { endpoint, .. }
            | FacilitatorClientError::Decode { endpoint, .. } => Some(*endpoint),
        }
    }
}

impl FacilitatorError for FacilitatorClientError {
    fn failure(&self) -> FacilitatorFailure {
        match self {
            FacilitatorClientError::InvalidUrl { .. } => FacilitatorFailure::Unreachable,
            FacilitatorClientError::Transport { source, .. }
            | FacilitatorClientError::Decode { source, .. }
                if source.is_timeout() =>
            {
                FacilitatorFailure::Timeout
            }
            FacilitatorClientError::Transport { .. } => FacilitatorFailure::Unreachable,
            FacilitatorClientError::Status { status, .. } => {
                FacilitatorFailure::Status(status.as_u16())
            }
            FacilitatorClientError::Decode { .. } => FacilitatorFailure::InvalidResponse,
        }
    }
}

/// Last `/supported` answer and when it goes stale. Not shared between clones.
#[derive(Debug)]
struct SupportedCache {
    ttl: Duration,
    entry: RwLock<Option<(Instant, SupportedResponse)>>,
}

impl SupportedCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    async fn fresh(&self) -> Option<SupportedResponse> {
        match self.entry.read().await.as_ref() {
            Some((expires_at, response)) if Instant::now() < *expires_at => Some(response.clone()),
            _ => None,
        }
    }

    async fn store(&self, response: SupportedResponse) {
        *self.entry.write().await = Some((Instant::now() + self.ttl, response));
    }

    async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// HTTP client for a remote facilitator.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    /// Sent with every call, e.g. an API key.
    headers: HeaderMap,
    timeout: Duration,
    supported_cache: SupportedCache,
}

impl FacilitatorClient {
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// A client for the facilitator at `base_url`. Endpoints are resolved
    /// relative to it, so keep a trailing `/` on a path prefix.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let endpoint_url = |endpoint: Endpoint| {
            base_url
                .join(endpoint.path())
                .map_err(|source| FacilitatorClientError::InvalidUrl {
                    url: base_url.to_string(),
                    source,
                })
        };
        Ok(Self {
            verify_url: endpoint_url(Endpoint::Verify)?,
            settle_url: endpoint_url(Endpoint::Settle)?,
            supported_url: endpoint_url(Endpoint::Supported)?,
            base_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    pub fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    pub fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        let mut this = self.clone();
        this.headers = headers;
        this
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = timeout;
        this
    }

    /// How long a `/supported` answer is reused. `Duration::ZERO` disables
    /// the cache.
    pub fn with_supported_cache_ttl(&self, ttl: Duration) -> Self {
        let mut this = self.clone();
        this.supported_cache = SupportedCache::new(ttl);
        this
    }

    /// Forgets the cached `/supported` answer.
    pub async fn invalidate_supported(&self) {
        self.supported_cache.invalidate().await;
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.verify", skip_all, err, fields(timeout = ?self.timeout))
    )]
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyResponse, FacilitatorClientError> {
        let builder = self.client.post(self.verify_url.clone()).json(request);
        self.call(Endpoint::Verify, builder).await
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.settle", skip_all, err, fields(timeout = ?self.timeout))
    )]
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettleResponse, FacilitatorClientError> {
        let builder = self.client.post(self.settle_url.clone()).json(request);
        self.call(Endpoint::Settle, builder).await
    }

    /// `GET /supported`, served from the cache while it is fresh.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.facilitator_client.supported", skip_all, err)
    )]
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        if let Some(response) = self.supported_cache.fresh().await {
            return Ok(response);
        }
        tracing::debug!("Fetching supported payment kinds from facilitator");
        let builder = self.client.get(self.supported_url.clone());
        let response: SupportedResponse = self.call(Endpoint::Supported, builder).await?;
        self.supported_cache.store(response.clone()).await;
        Ok(response)
    }

    /// Sends `builder` with the configured headers and timeout, and decodes a
    /// 200 answer as `R`.
    async fn call<R>(
        &self,
        endpoint: Endpoint,
        builder: RequestBuilder,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let response = builder
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Transport { endpoint, source })?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorClientError::Status {
                endpoint,
                status,
                body,
            });
        }
        response
            .json::<R>()
            .await
            .map_err(|source| FacilitatorClientError::Decode { endpoint, source })
    }
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        FacilitatorClient::verify(self, request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        FacilitatorClient::settle(self, request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        FacilitatorClient::supported(self).await
    }
}

/// Parses a base URL, normalizing it to exactly one trailing slash so the
/// endpoints land below its path.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = format!("{}/", value.trim_end_matches('/'));
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::InvalidUrl {
            url: value.to_string(),
            source,
        })?;
        FacilitatorClient::try_new(url)
    }
}
