//! Retry policy shared by every fetch path.
//!
//! One policy object decides which responses are retried, how long to back
//! off, and how `Retry-After` headers translate into a wait.

use crate::config::RetryConfig;
use crate::stealth::behavior::uniform_factor;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// What the fetcher should do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVerdict {
    /// 200 with a viable body.
    Accept,
    /// Throttling or transient failure; try again.
    Retry,
    /// 200 whose body is too short to be a real page.
    RetryShortBody,
    /// Not a rate-limit signal; give up now.
    Fail,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_retry_after: Duration,
    pub min_body_bytes: usize,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retry_after: Duration::from_millis(config.max_retry_after_ms),
            min_body_bytes: config.min_body_bytes,
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }

    /// Same policy without the minimum body check, for robots.txt and sitemaps.
    pub fn for_documents(&self) -> Self {
        Self {
            min_body_bytes: 0,
            ..self.clone()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Classify a response by status and body length.
    pub fn classify(&self, status: u16, body_len: usize) -> ResponseVerdict {
        match status {
            200 if body_len < self.min_body_bytes => ResponseVerdict::RetryShortBody,
            200 => ResponseVerdict::Accept,
            s if self.is_retryable(s) => ResponseVerdict::Retry,
            _ => ResponseVerdict::Fail,
        }
    }

    /// Exponential backoff with jitter after the given 1-based attempt:
    /// `min(cap, base * 2^attempt * uniform(1, 3))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(20) as i32);
        let delay = self.base_delay.mul_f64(exp * uniform_factor(1.0, 3.0));
        delay.min(self.max_delay)
    }

    /// Wait before the next attempt: the server's `Retry-After`, capped,
    /// or the local backoff when the server sent none.
    pub fn retry_delay(&self, retry_after: Option<Duration>, attempt: u32) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_retry_after),
            None => self.backoff(attempt),
        }
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// Dates in the past yield a zero wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
