//! Request executor: rate limit, timeout, retry with jittered backoff
//!
//! Every outbound HTTP call of the pipeline goes through
//! [`RequestExecutor::execute`]. The HTTP client itself sits behind the
//! [`HttpTransport`] trait so tests can script responses.

use crate::error::{EnrichmentError, ErrorCategory};
use crate::resilience::health_monitor::HealthMonitor;
use crate::resilience::rate_limiter::RateLimiter;
use crate::resilience::usage::{UsageEvent, UsageTracker};
use crate::types::RetryConfig;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default per-attempt abort timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("VBS/", env!("CARGO_PKG_VERSION"));

/// Outbound GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response: status plus body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport failure (no HTTP status was received)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// HTTP client seam
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by `reqwest`
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Timeouts are enforced by the executor, per attempt
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

/// Backoff before the retry following `attempt` (0-based), without jitter:
/// `min(initial * multiplier^attempt, max)`
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = config.initial_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = raw.min(config.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

fn jittered_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };
    backoff_delay(config, attempt) + Duration::from_millis(jitter)
}

/// Executes HTTP requests on behalf of source adapters
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
    health: Arc<HealthMonitor>,
    usage: Arc<UsageTracker>,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        rate_limiter: Arc<RateLimiter>,
        health: Arc<HealthMonitor>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            health,
            usage,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue `request` for `source_id`, retrying retryable failures.
    ///
    /// Makes at most `retry.max_retries + 1` attempts. Waiting for a rate
    /// limit permit is not an attempt. Returns the last error once the error
    /// is not retryable or attempts are exhausted.
    pub async fn execute(
        &self,
        request: &HttpRequest,
        source_id: &str,
        retry: &RetryConfig,
    ) -> Result<HttpResponse, EnrichmentError> {
        let mut attempt = 0u32;
        loop {
            self.acquire_permit(source_id).await?;

            if attempt > 0 {
                self.usage.record(source_id, UsageEvent::Retry).await;
            }
            self.usage.record(source_id, UsageEvent::Request).await;
            debug!(source_id = %source_id, attempt, url = %request.url, "Issuing request");

            let error = match self.attempt(request, source_id).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            self.health.record_failure(source_id).await;
            self.usage.record(source_id, UsageEvent::Failure).await;

            if !error.is_retryable() || attempt >= retry.max_retries {
                warn!(
                    source_id = %source_id,
                    attempt,
                    category = %error.category(),
                    error = %error,
                    "Request failed, giving up"
                );
                return Err(error);
            }

            let delay = jittered_delay(retry, attempt);
            debug!(
                source_id = %source_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                category = %error.category(),
                "Retry scheduled"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One timed HTTP exchange; records success (with latency) on 2xx
    async fn attempt(
        &self,
        request: &HttpRequest,
        source_id: &str,
    ) -> Result<HttpResponse, EnrichmentError> {
        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.transport.send(request)).await
        {
            Err(_) => {
                return Err(EnrichmentError::request(
                    source_id,
                    ErrorCategory::Timeout,
                    format!("request aborted after {} ms", self.timeout.as_millis()),
                ))
            }
            Ok(Err(e)) => {
                return Err(EnrichmentError::request(
                    source_id,
                    ErrorCategory::Network,
                    e.to_string(),
                ))
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return Err(EnrichmentError::from_status(
                source_id,
                response.status,
                &response.body,
            ));
        }

        self.health.record_success(source_id, started.elapsed()).await;
        self.usage.record(source_id, UsageEvent::Success).await;
        Ok(response)
    }

    /// Poll the rate limiter until a permit is granted
    async fn acquire_permit(&self, source_id: &str) -> Result<(), EnrichmentError> {
        while !self.rate_limiter.try_acquire(source_id).await {
            let wait = self
                .rate_limiter
                .wait_time(source_id)
                .await
                .ok_or_else(|| EnrichmentError::UnknownSource(source_id.to_string()))?;
            self.usage.record(source_id, UsageEvent::RateLimitWait).await;
            debug!(
                source_id = %source_id,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate limit permit"
            );
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetadataSource, RateLimitConfig};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use vbs_common::events::EventBus;

    enum Step {
        Respond(u16),
        Fail,
        Hang,
    }

    struct Scripted {
        steps: StdMutex<VecDeque<Step>>,
        calls: StdMutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: StdMutex::new(steps.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.lock().unwrap().push(Instant::now());
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Respond(200));
            match step {
                Step::Respond(status) => Ok(HttpResponse {
                    status,
                    body: "{}".to_string(),
                }),
                Step::Fail => Err(TransportError("connection refused".to_string())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(HttpResponse {
                        status: 200,
                        body: String::new(),
                    })
                }
            }
        }
    }

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter_ms: 0,
            ..RetryConfig::default()
        }
    }

    fn executor(
        transport: Arc<Scripted>,
        burst: u32,
    ) -> (RequestExecutor, Arc<HealthMonitor>, Arc<UsageTracker>) {
        let mut source = MetadataSource::tmdb();
        source.rate_limit = RateLimitConfig {
            requests_per_second: 1.0,
            burst_size: burst,
        };
        let health = Arc::new(HealthMonitor::new(EventBus::new(64)));
        let usage = Arc::new(UsageTracker::new());
        let executor = RequestExecutor::new(
            transport,
            Arc::new(RateLimiter::new(&[source])),
            health.clone(),
            usage.clone(),
        );
        (executor, health, usage)
    }

    /// Paused-clock timers may land a tick late
    fn assert_gap(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(30));
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounded() {
        let config = RetryConfig::default();
        for _ in 0..100 {
            let delay = jittered_delay(&config, 0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds_with_backoff() {
        let transport = Scripted::new(vec![Step::Respond(503), Step::Respond(503), Step::Respond(200)]);
        let (executor, health, usage) = executor(transport.clone(), 10);

        let response = executor
            .execute(&HttpRequest::get("https://example.test"), "tmdb", &no_jitter())
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let calls = transport.call_times();
        assert_eq!(calls.len(), 3);
        assert_gap(calls[1] - calls[0], Duration::from_secs(1));
        assert_gap(calls[2] - calls[1], Duration::from_secs(2));

        assert!(health.status("tmdb").await.unwrap().is_healthy);
        let stats = usage.get("tmdb").await;
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let transport = Scripted::new(vec![Step::Respond(401), Step::Respond(200)]);
        let (executor, _, _) = executor(transport.clone(), 10);

        let err = executor
            .execute(&HttpRequest::get("https://example.test"), "tmdb", &no_jitter())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Authentication);
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error_and_open_circuit() {
        let transport = Scripted::new(vec![
            Step::Fail,
            Step::Respond(503),
            Step::Respond(429),
            Step::Respond(502),
        ]);
        let (executor, health, _) = executor(transport.clone(), 10);

        let err = executor
            .execute(&HttpRequest::get("https://example.test"), "tmdb", &no_jitter())
            .await
            .unwrap_err();
        assert_eq!(transport.call_times().len(), 4);
        assert!(matches!(err, EnrichmentError::Request { status: Some(502), .. }));
        assert!(!health.status("tmdb").await.unwrap().is_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_request_times_out() {
        let transport = Scripted::new(vec![Step::Hang]);
        let (executor, _, _) = executor(transport.clone(), 10);
        let retry = RetryConfig {
            max_retries: 0,
            ..no_jitter()
        };

        let started = Instant::now();
        let err = executor
            .execute(&HttpRequest::get("https://example.test"), "tmdb", &retry)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_gap(started.elapsed(), DEFAULT_REQUEST_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_is_not_an_attempt() {
        let transport = Scripted::new(vec![]);
        let (executor, _, usage) = executor(transport.clone(), 1);
        let request = HttpRequest::get("https://example.test");

        executor.execute(&request, "tmdb", &no_jitter()).await.unwrap();
        executor.execute(&request, "tmdb", &no_jitter()).await.unwrap();

        let calls = transport.call_times();
        assert_gap(calls[1] - calls[0], Duration::from_secs(1));
        let stats = usage.get("tmdb").await;
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.retries, 0);
        assert_eq!(stats.rate_limit_waits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_without_bucket_fails() {
        let transport = Scripted::new(vec![]);
        let (executor, _, _) = executor(transport.clone(), 1);

        let err = executor
            .execute(&HttpRequest::get("https://example.test"), "memory-alpha", &no_jitter())
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::UnknownSource(id) if id == "memory-alpha"));
        assert!(transport.call_times().is_empty());
    }
}
