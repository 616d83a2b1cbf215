use std::num::NonZeroU32;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(Method),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{method} {url} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        method: Method,
        url: String,
        attempts: u32,
        last_error: String,
    },
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Attempts budget for network failures and 5xx responses
    pub max_attempts: u32,
    /// Per-call timeout
    pub timeout: Duration,
    /// The n-th retry waits `backoff_unit * backoff_base^n`
    pub backoff_base: f32,
    pub backoff_unit: Duration,
    pub max_backoff: Duration,
    /// A 429 with `Retry-After: s` waits `rate_limit_unit * s`
    pub rate_limit_unit: Duration,
    pub default_retry_after_secs: u64,
    pub max_rate_limit_retries: u32,
    pub requests_per_second: Option<u32>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            rate_limit_unit: Duration::from_secs(1),
            default_retry_after_secs: 5,
            max_rate_limit_retries: 10,
            requests_per_second: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        );
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Seconds from the `Retry-After` header, if present and numeric
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Performs a single HTTP exchange. Retry policy lives in [`Transport`].
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl Default for ReqwestBackend {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Outbound calls with timeout, retry with exponential backoff on network
/// failures and 5xx, and `Retry-After` waits on 429.
///
/// Statuses other than 429 and 5xx are handed back to the caller untouched.
pub struct Transport<B: HttpBackend = ReqwestBackend> {
    backend: B,
    config: TransportConfig,
    limiter: Option<DirectRateLimiter>,
}

impl Transport<ReqwestBackend> {
    pub fn reqwest(config: TransportConfig) -> Self {
        Self::new(ReqwestBackend::default(), config)
    }
}

impl<B: HttpBackend> Transport<B> {
    pub fn new(backend: B, config: TransportConfig) -> Self {
        let limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));
        Self {
            backend,
            config,
            limiter,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.config.backoff_unit.mul_f32(self.config.backoff_base))
            .with_factor(self.config.backoff_base)
            .with_max_delay(self.config.max_backoff)
            .with_max_times(self.config.max_attempts as usize)
            .build()
    }

    fn rate_limit_wait(&self, response: &HttpResponse) -> (u64, Duration) {
        let secs = response
            .retry_after_secs()
            .unwrap_or(self.config.default_retry_after_secs);
        let factor = u32::try_from(secs).unwrap_or(u32::MAX);
        (secs, self.config.rate_limit_unit.saturating_mul(factor))
    }

    pub async fn call(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if ![Method::GET, Method::POST, Method::PUT].contains(&request.method) {
            return Err(TransportError::UnsupportedMethod(request.method));
        }

        let max_attempts = self.config.max_attempts;
        let mut delays = self.backoff();
        let mut failures = 0u32;
        let mut rate_limited = 0u32;
        let mut last_error;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            match self.backend.execute(&request, self.config.timeout).await {
                Ok(response) if response.status == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited += 1;
                    if rate_limited > self.config.max_rate_limit_retries {
                        last_error = format!("still rate limited after {} waits", rate_limited - 1);
                        break;
                    }
                    let (retry_after, wait) = self.rate_limit_wait(&response);
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        retry_after,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited (429), waiting before retrying"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(response) if response.status.is_server_error() => {
                    last_error = format!("HTTP {}", response.status);
                }
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_error = error.to_string();
                }
            }

            failures += 1;
            if failures >= max_attempts {
                break;
            }

            let delay = delays.next().unwrap_or(self.config.max_backoff);
            tracing::warn!(
                method = %request.method,
                url = %request.url,
                attempt = failures,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        tracing::error!(
            method = %request.method,
            url = %request.url,
            attempts = failures,
            error = %last_error,
            "Request failed after all attempts"
        );
        Err(TransportError::Exhausted {
            method: request.method,
            url: request.url.to_string(),
            attempts: failures,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use reqwest::header::HeaderValue;
    use std::time::Instant;

    fn fast_config() -> TransportConfig {
        TransportConfig {
            backoff_unit: Duration::from_millis(1),
            rate_limit_unit: Duration::from_millis(5),
            ..TransportConfig::default()
        }
    }

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    fn rate_limited(retry_after: &'static str) -> HttpResponse {
        let mut response = response(429);
        response
            .headers
            .insert(RETRY_AFTER, HeaderValue::from_static(retry_after));
        response
    }

    fn get() -> HttpRequest {
        HttpRequest::new(Method::GET, Url::parse("https://api.test/v1/me").unwrap())
    }

    #[tokio::test]
    async fn test_unsupported_method_fails_without_calling_backend() {
        let mut backend = MockHttpBackend::new();
        backend.expect_execute().never();
        let transport = Transport::new(backend, fast_config());

        let request = HttpRequest::new(
            Method::DELETE,
            Url::parse("https://api.test/v1/playlists/1").unwrap(),
        );
        let result = transport.call(request).await;

        assert!(matches!(
            result,
            Err(TransportError::UnsupportedMethod(method)) if method == Method::DELETE
        ));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(503)));
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(200)));
        let transport = Transport::new(backend, fast_config());

        let result = transport.call(get()).await.unwrap();
        assert_eq!(result.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_network_error_is_retried() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(TransportError::Network("connection reset".into())));
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(200)));
        let transport = Transport::new(backend, fast_config());

        assert!(transport.call(get()).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_exhaustion_carries_method_and_url() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(3)
            .returning(|_, _| Ok(response(500)));
        let transport = Transport::new(backend, fast_config());

        match transport.call(get()).await {
            Err(TransportError::Exhausted {
                method,
                url,
                attempts,
                last_error,
            }) => {
                assert_eq!(method, Method::GET);
                assert_eq!(url, "https://api.test/v1/me");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("500"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_returned_as_is() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(1)
            .returning(|_, _| Ok(response(404)));
        let transport = Transport::new(backend, fast_config());

        let result = transport.call(get()).await.unwrap();
        assert_eq!(result.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_limit_waits_and_does_not_use_attempt_budget() {
        let mut backend = MockHttpBackend::new();
        let mut seq = Sequence::new();
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(rate_limited("2")));
        backend
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(response(201)));
        // A single attempt: the retry after 429 must not consume it
        let transport = Transport::new(
            backend,
            TransportConfig {
                max_attempts: 1,
                ..fast_config()
            },
        );

        let started = Instant::now();
        let result = transport.call(get()).await.unwrap();

        assert_eq!(result.status, StatusCode::CREATED);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_capped() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(3)
            .returning(|_, _| Ok(rate_limited("0")));
        let transport = Transport::new(
            backend,
            TransportConfig {
                max_rate_limit_retries: 2,
                ..fast_config()
            },
        );

        let result = transport.call(get()).await;
        assert!(matches!(result, Err(TransportError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_requests_are_paced_to_quota() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(11)
            .returning(|_, _| Ok(response(200)));
        let transport = Transport::new(
            backend,
            TransportConfig {
                requests_per_second: Some(10),
                ..fast_config()
            },
        );

        // The quota allows a burst of 10; the 11th call waits for a new cell
        let started = Instant::now();
        for _ in 0..11 {
            assert!(transport.call(get()).await.unwrap().is_success());
        }

        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_zero_quota_disables_pacing() {
        let mut backend = MockHttpBackend::new();
        backend
            .expect_execute()
            .times(20)
            .returning(|_, _| Ok(response(200)));
        let transport = Transport::new(
            backend,
            TransportConfig {
                requests_per_second: Some(0),
                ..fast_config()
            },
        );

        let started = Instant::now();
        for _ in 0..20 {
            transport.call(get()).await.unwrap();
        }

        assert!(transport.limiter.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_is_exponential_in_base() {
        let transport = Transport::new(
            MockHttpBackend::new(),
            TransportConfig {
                backoff_unit: Duration::from_secs(1),
                ..TransportConfig::default()
            },
        );
        let delays: Vec<_> = transport.backoff().take(2).collect();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[test]
    fn test_missing_retry_after_uses_default() {
        let transport = Transport::new(MockHttpBackend::new(), fast_config());
        let (secs, wait) = transport.rate_limit_wait(&response(429));
        assert_eq!(secs, 5);
        assert_eq!(wait, Duration::from_millis(25));
    }
}
