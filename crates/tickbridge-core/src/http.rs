//! Resilient HTTP client: cache lookup, rate-limit admission, transport
//! call, retry loop and error classification behind one `fetch` entry point.

use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Default per-attempt request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on idle pooled connections per host.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Classified fetch failure.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A single attempt exceeded its request timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The whole operation, retries included, exceeded the client-wide
    /// deadline.
    #[error("operation against {url} exceeded its {deadline:?} deadline")]
    DeadlineExceeded { url: String, deadline: Duration },

    /// Transport-level failure before any response arrived.
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// Non-2xx response other than 429.
    #[error("request to {url} returned status {status}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// Status-429 specialization carrying the server's retry hint, if any.
    #[error("request to {url} was rate limited by the server")]
    RateLimited {
        url: String,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The response body was not valid JSON.
    #[error("response from {url} is not valid JSON: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid client configuration.
    #[error("failed to build http client: {message}")]
    Build { message: String },
}

impl HttpError {
    /// The HTTP status behind this error, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Server-provided retry hint, present only on 429 responses that
    /// carried a parseable `Retry-After` header.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// One transport call, fully resolved: the client has already merged
/// headers and expanded query parameters into the URL.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Raw transport outcome before classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer; no response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect { message: String },
    Other { message: String },
}

/// Pluggable transport seam.
///
/// Object-safe so tests can substitute a scripted transport; the returned
/// future is boxed for the same reason.
pub trait HttpTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportFailure>> + Send + 'a>>;
}

/// Production transport backed by a pooled reqwest client.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(max_connections: usize) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(|e| HttpError::Build {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportFailure>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut builder = self
                .client
                .get(&request.url)
                .timeout(request.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;

            let status = response.status().as_u16();
            let mut headers = BTreeMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
                }
            }
            let body = response.text().await.map_err(classify_reqwest_error)?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout
    } else if error.is_connect() {
        TransportFailure::Connect {
            message: error.to_string(),
        }
    } else {
        TransportFailure::Other {
            message: error.to_string(),
        }
    }
}

/// How a fetch interacts with the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve a fresh cached response when available, store successes.
    Use,
    /// Skip the lookup but store the fetched response.
    Refresh,
    /// Neither read nor write the cache.
    Bypass,
}

impl Default for CacheMode {
    fn default() -> Self {
        Self::Use
    }
}

/// A single logical GET request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    timeout: Option<Duration>,
    cache_mode: CacheMode,
    cache_ttl: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout: None,
            cache_mode: CacheMode::default(),
            cache_ttl: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Per-attempt timeout override for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// TTL override for the cached response.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Full URL with query parameters appended in sorted order.
    ///
    /// The deterministic parameter order makes this double as the cache
    /// key: two requests for the same resource always produce the same
    /// string regardless of how their parameters were added.
    pub fn request_url(&self) -> String {
        if self.params.is_empty() {
            return self.url.clone();
        }
        let query: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect();
        format!("{}?{}", self.url, query.join("&"))
    }
}

/// Construction-time configuration for [`HttpClient`].
pub struct HttpClientBuilder {
    timeout: Duration,
    operation_timeout: Option<Duration>,
    max_connections: usize,
    default_headers: BTreeMap<String, String>,
    retry: RetryPolicy,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache: Option<ResponseCache>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            operation_timeout: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_headers: BTreeMap::new(),
            retry: RetryPolicy::default(),
            rate_limiter: None,
            cache: None,
            transport: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deadline for a whole fetch, retries and backoff waits included.
    pub fn operation_timeout(mut self, deadline: Duration) -> Self {
        self.operation_timeout = Some(deadline);
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Header sent with every request unless the request overrides it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Admit at most `requests_per_second` requests with a burst allowance
    /// of `burst` tokens.
    ///
    /// # Panics
    ///
    /// Panics if `requests_per_second` is not positive or `burst` is below
    /// one token, per [`RateLimiter::new`].
    pub fn rate_limit(mut self, requests_per_second: f64, burst: f64) -> Self {
        self.rate_limiter = Some(Arc::new(RateLimiter::new(requests_per_second, burst)));
        self
    }

    /// Share an existing limiter across several clients.
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Enable response caching with the given capacity and default TTL.
    pub fn cache(mut self, max_size: usize, default_ttl: Duration) -> Self {
        self.cache = Some(ResponseCache::new(max_size, default_ttl));
        self
    }

    /// Share an existing cache across several clients.
    pub fn response_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replace the transport; used by tests to script responses.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<HttpClient, HttpError> {
        if self.timeout.is_zero() {
            return Err(HttpError::Build {
                message: "timeout must be positive".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(HttpError::Build {
                message: "max_connections must be positive".to_string(),
            });
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.max_connections)?),
        };

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                timeout: self.timeout,
                operation_timeout: self.operation_timeout,
                default_headers: self.default_headers,
                retry: self.retry,
                rate_limiter: self.rate_limiter,
                cache: self.cache,
                transport,
            }),
        })
    }
}

struct ClientInner {
    timeout: Duration,
    operation_timeout: Option<Duration>,
    default_headers: BTreeMap<String, String>,
    retry: RetryPolicy,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache: Option<ResponseCache>,
    transport: Arc<dyn HttpTransport>,
}

/// Resilient HTTP client.
///
/// A fetch runs through cache lookup, rate-limit admission, the transport
/// call, the retry loop and error classification, then writes successes
/// back to the cache. Clones share the limiter, cache and connection pool.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Fetch the resource and return the raw response body.
    pub async fn fetch_text(&self, request: &FetchRequest) -> Result<String, HttpError> {
        self.fetch(request).await
    }

    /// Fetch the resource and parse the body as JSON.
    pub async fn fetch_json(&self, request: &FetchRequest) -> Result<Value, HttpError> {
        let url = request.request_url();
        let body = self.fetch(request).await?;
        serde_json::from_str(&body).map_err(|source| HttpError::Parse { url, source })
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<String, HttpError> {
        let url = request.request_url();

        if request.cache_mode == CacheMode::Use {
            if let Some(cache) = &self.inner.cache {
                if let Some(hit) = cache.get(&url).await {
                    debug!("cache hit: {}", url);
                    return Ok(hit);
                }
            }
        }

        match self.inner.operation_timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.fetch_uncached(request, &url)).await {
                    Ok(result) => result,
                    Err(_) => Err(HttpError::DeadlineExceeded { url, deadline }),
                }
            }
            None => self.fetch_uncached(request, &url).await,
        }
    }

    /// Rate-limit admission, transport call and retry loop. Cancellation at
    /// any await point leaves the limiter and cache untouched.
    async fn fetch_uncached(&self, request: &FetchRequest, url: &str) -> Result<String, HttpError> {
        if let Some(limiter) = &self.inner.rate_limiter {
            limiter.acquire().await;
        }

        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), value.clone());
        }
        let timeout = request.timeout.unwrap_or(self.inner.timeout);

        let mut attempt = 0u32;
        loop {
            let outcome = self
                .inner
                .transport
                .send(TransportRequest {
                    url: url.to_string(),
                    headers: headers.clone(),
                    timeout,
                })
                .await;

            let error = match outcome {
                Ok(response) if response.is_success() => {
                    if request.cache_mode != CacheMode::Bypass {
                        if let Some(cache) = &self.inner.cache {
                            cache
                                .set(url, response.body.clone(), request.cache_ttl)
                                .await;
                        }
                    }
                    return Ok(response.body);
                }
                Ok(response) if response.status == 429 => HttpError::RateLimited {
                    url: url.to_string(),
                    retry_after: parse_retry_after(&response.headers),
                    body: response.body,
                },
                Ok(response) => HttpError::Status {
                    url: url.to_string(),
                    status: response.status,
                    body: response.body,
                },
                Err(TransportFailure::Timeout) => HttpError::Timeout {
                    url: url.to_string(),
                },
                Err(TransportFailure::Connect { message }) => HttpError::Connection {
                    url: url.to_string(),
                    message,
                },
                Err(TransportFailure::Other { message }) => HttpError::Connection {
                    url: url.to_string(),
                    message,
                },
            };

            let Some(status) = error.status_code() else {
                return Err(error);
            };
            if !self.inner.retry.should_retry(status, attempt) {
                return Err(error);
            }

            let delay = error
                .retry_after()
                .unwrap_or_else(|| self.inner.retry.delay(attempt));
            debug!(
                "retrying {} in {:?} after status {} (attempt {})",
                url,
                delay,
                status,
                attempt + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Parse a `Retry-After` header in delay-seconds form.
///
/// The HTTP-date form is recognized but not honored; it is logged and the
/// computed backoff applies instead.
fn parse_retry_after(headers: &BTreeMap<String, String>) -> Option<Duration> {
    let value = headers.get("retry-after")?;
    match value.trim().parse::<u64>() {
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(_) => {
            warn!("ignoring non-numeric retry-after header: {}", value);
            None
        }
    }
}
