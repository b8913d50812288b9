//! Pooled HTTP client for one target host.
//!
//! Every request goes through the shared [`RateLimiter`] and the shared
//! [`RetryPolicy`]. Failures are recovered internally while the retry budget
//! lasts; after that they surface as an [`ErrorKind`] on the [`FetchResult`]
//! rather than as an `Err`.

use crate::acquisition::retry::{parse_retry_after, ResponseVerdict, RetryPolicy};
use crate::cartography::rate_limiter::RateLimiter;
use crate::error::ErrorKind;
use crate::stealth::fingerprint::browser_headers;
use crate::types::FetchResult;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, RETRY_AFTER};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// A single response, before retry classification.
#[derive(Debug, Clone)]
struct RawResponse {
    status: u16,
    final_url: String,
    body: Vec<u8>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    retry_after: Option<Duration>,
}

/// HTTP fetcher bound to one site.
pub struct HttpClient {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    referer: String,
    requests_sent: AtomicU64,
    throttled_responses: AtomicU64,
}

impl HttpClient {
    /// Build a client for `base_url` with keep-alive pooling and redirects on.
    pub fn new(
        base_url: &Url,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .build()?;

        let mut root = base_url.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);

        Ok(Self {
            client,
            limiter,
            policy,
            referer: root.to_string(),
            requests_sent: AtomicU64::new(0),
            throttled_responses: AtomicU64::new(0),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Requests actually put on the wire, retries included.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Responses with status 429.
    pub fn throttled_responses(&self) -> u64 {
        self.throttled_responses.load(Ordering::Relaxed)
    }

    /// Fetch a product or candidate page. Short 200 bodies are retried.
    pub async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_with(url, &self.policy).await
    }

    /// Fetch robots.txt or a sitemap. Any 200 body is accepted.
    pub async fn fetch_document(&self, url: &str) -> FetchResult {
        let policy = self.policy.for_documents();
        self.fetch_with(url, &policy).await
    }

    async fn fetch_with(&self, url: &str, policy: &RetryPolicy) -> FetchResult {
        let started = Instant::now();
        let mut pending_hint: Option<Duration> = None;
        let mut last_status = 0u16;
        let mut last_error = ErrorKind::Timeout;
        let mut last_final_url: Option<String> = None;

        if let Err(e) = Url::parse(url) {
            return failed_result(url, 0, started.elapsed(), 0, ErrorKind::InvalidUrl {
                message: e.to_string(),
            });
        }

        for attempt in 1..=policy.max_attempts {
            self.limiter.acquire(pending_hint.take()).await;
            self.requests_sent.fetch_add(1, Ordering::Relaxed);

            let response = match self.send_once(url).await {
                Ok(r) => r,
                Err(kind) => {
                    let retryable = !matches!(kind, ErrorKind::InvalidUrl { .. });
                    debug!(url, attempt, error = %kind, "request failed");
                    last_error = kind;
                    if !retryable {
                        break;
                    }
                    pending_hint = Some(policy.backoff(attempt));
                    continue;
                }
            };

            last_status = response.status;
            last_final_url = Some(response.final_url.clone());

            match policy.classify(response.status, response.body.len()) {
                ResponseVerdict::Accept => {
                    return FetchResult {
                        url: url.to_string(),
                        final_url: Some(response.final_url),
                        status_code: response.status,
                        body: Some(response.body),
                        content_type: response.content_type,
                        content_encoding: response.content_encoding,
                        elapsed: started.elapsed(),
                        attempt,
                        error: None,
                    };
                }
                ResponseVerdict::Retry => {
                    let delay = policy.retry_delay(response.retry_after, attempt);
                    if response.status == 429 {
                        self.throttled_responses.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            url,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "server throttled request"
                        );
                        last_error = ErrorKind::RateLimited;
                    } else {
                        debug!(url, attempt, status = response.status, "retryable status");
                        last_error = ErrorKind::HttpError {
                            code: response.status,
                        };
                    }
                    pending_hint = Some(delay);
                }
                ResponseVerdict::RetryShortBody => {
                    debug!(url, attempt, bytes = response.body.len(), "short body, retrying");
                    last_error = ErrorKind::EmptyBody;
                    pending_hint = Some(policy.backoff(attempt));
                }
                ResponseVerdict::Fail => {
                    let mut result = failed_result(
                        url,
                        response.status,
                        started.elapsed(),
                        attempt,
                        ErrorKind::HttpError {
                            code: response.status,
                        },
                    );
                    result.final_url = Some(response.final_url);
                    return result;
                }
            }
        }

        warn!(url, error = %last_error, "giving up after retries");
        let mut result = failed_result(
            url,
            last_status,
            started.elapsed(),
            policy.max_attempts,
            last_error,
        );
        result.final_url = last_final_url;
        result
    }

    async fn send_once(&self, url: &str) -> Result<RawResponse, ErrorKind> {
        let response = self
            .client
            .get(url)
            .headers(browser_headers(&self.referer))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response.headers();
        let header_str = |name: reqwest::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header_str(CONTENT_TYPE);
        let content_encoding = header_str(CONTENT_ENCODING);
        let retry_after = header_str(RETRY_AFTER)
            .and_then(|v| parse_retry_after(&v, chrono::Utc::now()));

        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec();

        Ok(RawResponse {
            status,
            final_url,
            body,
            content_type,
            content_encoding,
            retry_after,
        })
    }
}

fn failed_result(
    url: &str,
    status: u16,
    elapsed: Duration,
    attempt: u32,
    error: ErrorKind,
) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        final_url: None,
        status_code: status,
        body: None,
        content_type: None,
        content_encoding: None,
        elapsed,
        attempt,
        error: Some(error),
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_builder() {
        ErrorKind::InvalidUrl {
            message: e.to_string(),
        }
    } else {
        ErrorKind::Network {
            message: e.to_string(),
        }
    }
}
