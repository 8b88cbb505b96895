//! HTTP downloader
//!
//! Every outbound request passes through here. The downloader:
//! - Holds a network-gate slot for the whole request, retry waits included
//! - Retries transient failures, honoring `retry-after`
//! - Tracks in-flight requests and a moving average of request latency
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx | Return body |
//! | HTTP 404 on a body fetch | Immediate `NotFound` |
//! | HTTP 408, 413, 429, 500, 502, 503, 504, 521, 522, 524 | Retry |
//! | Other HTTP status | Immediate `Status` |
//! | Timeout / connection error | Retry |
//! | Any other transport error | Immediate `Http` |
//!
//! A retry waits `retry-after` seconds when the response carries that header
//! and `attempt` seconds otherwise. Once `max_retries` retries are spent the
//! request fails with `RetriesExhausted`.

use crate::config::{Config, UserAgentConfig};
use crate::crawler::AdmissionGate;
use crate::output::NetworkSnapshot;
use crate::{FetchError, FetchResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Statuses worth another attempt
const RETRYABLE_STATUSES: [u16; 10] = [408, 413, 429, 500, 502, 503, 504, 521, 522, 524];

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL)
    let user_agent = format!(
        "{}/{} (+{})",
        config.crawler_name, config.crawler_version, config.contact_url
    );

    // The upstream host serves a broken certificate chain
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .danger_accept_invalid_certs(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if a response with this status should be retried
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Delay before the next attempt
///
/// `attempt` is the number of the attempt that just failed, counted from 1.
pub fn retry_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    match retry_after {
        Some(seconds) => Duration::from_secs(seconds),
        None => Duration::from_secs(u64::from(attempt)),
    }
}

/// Reads an integer `retry-after` header; HTTP-date values are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Decrements the in-flight count even if the request future is dropped
struct InflightGuard<'a>(&'a AtomicUsize);

impl<'a> InflightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared, gated HTTP downloader
pub struct Downloader {
    client: Client,
    gate: AdmissionGate,
    max_retries: u32,
    inflight: AtomicUsize,
    /// Moving average in milliseconds
    avg_latency: Mutex<f64>,
}

impl Downloader {
    pub fn new(client: Client, gate: AdmissionGate, max_retries: u32) -> Self {
        Self {
            client,
            gate,
            max_retries,
            inflight: AtomicUsize::new(0),
            avg_latency: Mutex::new(0.0),
        }
    }

    /// Builds the process-wide downloader from configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawler.request_timeout_secs),
        )?;
        Ok(Self::new(
            client,
            AdmissionGate::new(config.crawler.network_concurrency),
            config.crawler.max_retries,
        ))
    }

    /// Fetches `url` and decodes the body as JSON
    pub async fn download_json<T: DeserializeOwned>(&self, url: &str) -> FetchResult<T> {
        let body = self.download(url, false).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Fetches `url` as text; a 404 fails at once with `NotFound`
    pub async fn download_body(&self, url: &str) -> FetchResult<String> {
        self.download(url, true).await
    }

    /// Current in-flight count and average latency
    pub fn snapshot(&self) -> NetworkSnapshot {
        let avg = *self
            .avg_latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        NetworkSnapshot {
            inflight: self.inflight.load(Ordering::SeqCst),
            avg_latency_ms: avg,
        }
    }

    async fn download(&self, url: &str, not_found_is_final: bool) -> FetchResult<String> {
        let _permit = self.gate.acquire().await?;
        let started = Instant::now();
        let result = {
            let _inflight = InflightGuard::enter(&self.inflight);
            self.download_with_retries(url, not_found_is_final).await
        };
        self.record_latency(started.elapsed());
        result
    }

    async fn download_with_retries(
        &self,
        url: &str,
        not_found_is_final: bool,
    ) -> FetchResult<String> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let (last_error, retry_after) = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.text().await.map_err(|source| FetchError::Http {
                            url: url.to_string(),
                            source,
                        });
                    }

                    if status == StatusCode::NOT_FOUND && not_found_is_final {
                        return Err(FetchError::NotFound {
                            url: url.to_string(),
                        });
                    }

                    if !is_retryable_status(status.as_u16()) {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    }

                    (
                        format!("HTTP {}", status.as_u16()),
                        parse_retry_after(response.headers()),
                    )
                }
                Err(e) if e.is_timeout() || e.is_connect() => (e.to_string(), None),
                Err(source) => {
                    return Err(FetchError::Http {
                        url: url.to_string(),
                        source,
                    })
                }
            };

            if attempt > self.max_retries {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: last_error,
                });
            }

            let delay = retry_delay(attempt, retry_after);
            tracing::debug!(
                "Attempt {} for {} failed ({}), retrying in {:?}",
                attempt,
                url,
                last_error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        let weight = self.gate.capacity() as f64;
        let mut avg = self
            .avg_latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *avg = (*avg * (weight - 1.0) + sample) / weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
        }
    }

    fn downloader(max_retries: u32) -> Downloader {
        let client = build_http_client(&create_test_config(), Duration::from_secs(5)).unwrap();
        Downloader::new(client, AdmissionGate::new(4), max_retries)
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&create_test_config(), Duration::from_secs(30));
        assert!(client.is_ok());
    }

    #[test]
    fn test_retry_delay_uses_retry_after() {
        assert_eq!(retry_delay(1, Some(7)), Duration::from_secs(7));
        assert_eq!(retry_delay(4, Some(0)), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_grows_with_attempt() {
        assert_eq!(retry_delay(1, None), Duration::from_secs(1));
        assert_eq!(retry_delay(3, None), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(7));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [408, 429, 500, 503, 524] {
            assert!(is_retryable_status(status), "{status} should retry");
        }
        for status in [400, 403, 404, 501] {
            assert!(!is_retryable_status(status), "{status} should not retry");
        }
    }

    #[tokio::test]
    async fn test_download_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comments"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"content":"x"}"#))
            .mount(&server)
            .await;

        let downloader = downloader(0);
        let value: serde_json::Value = downloader
            .download_json(&format!("{}/comments", server.uri()))
            .await
            .unwrap();

        assert_eq!(value["content"], "x");
        assert_eq!(downloader.snapshot().inflight, 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result: FetchResult<serde_json::Value> =
            downloader(0).download_json(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_body_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/9"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let result = downloader(5)
            .download_body(&format!("{}/posts/9", server.uri()))
            .await;

        assert!(matches!(result, Err(FetchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_forbidden_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let result = downloader(5).download_body(&server.uri()).await;
        assert!(matches!(result, Err(FetchError::Status { status: 403, .. })));
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let result = downloader(0).download_body(&server.uri()).await;
        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 1, .. })
        ));
    }

    /// Answers `status` once with the given headers, then 200 "ok"
    async fn fail_once(server: &MockServer, status: u16, retry_after: Option<&str>) {
        let mut first = ResponseTemplate::new(status);
        if let Some(value) = retry_after {
            first = first.insert_header("retry-after", value);
        }
        Mock::given(method("GET"))
            .respond_with(first)
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_retry_after_is_honored() {
        let server = MockServer::start().await;
        fail_once(&server, 429, Some("2")).await;

        let downloader = downloader(3);
        let started = Instant::now();
        let body = downloader.download_body(&server.uri()).await.unwrap();
        let elapsed = started.elapsed();

        // Without the header the first retry would come after one second
        assert_eq!(body, "ok");
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(2900), "{elapsed:?}");
        assert!(downloader.snapshot().avg_latency_ms > 0.0);
    }

    #[tokio::test]
    async fn test_zero_retry_after_retries_immediately() {
        let server = MockServer::start().await;
        fail_once(&server, 503, Some("0")).await;

        let started = Instant::now();
        let body = downloader(3).download_body(&server.uri()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(body, "ok");
        assert!(elapsed < Duration::from_millis(900), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_backoff_without_retry_after() {
        let server = MockServer::start().await;
        fail_once(&server, 503, None).await;

        let started = Instant::now();
        let body = downloader(3).download_body(&server.uri()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(body, "ok");
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1900), "{elapsed:?}");
    }
}
