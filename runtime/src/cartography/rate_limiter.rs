//! Rate limiter for polite crawling.
//!
//! A leaky bucket that releases one permit per `base_interval`, stretched or
//! shrunk by a random jitter so that many workers sharing one limiter do not
//! fire in lockstep. A `Retry-After` hint from the server pushes the schedule
//! forward and always wins over the local pacing.

use crate::stealth::behavior::jitter_factor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Shared pacer for every request sent to one host.
pub struct RateLimiter {
    next_slot: Mutex<Instant>,
    /// Nominal gap in nanoseconds. Only ever grows after construction.
    base_interval_nanos: AtomicU64,
    jitter_fraction: f64,
    grants: AtomicU64,
    backpressure_events: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// - `requests_per_second`: sustained request rate
    /// - `jitter_fraction`: interval noise, e.g. `0.2` for ±20%
    pub fn new(requests_per_second: f64, jitter_fraction: f64) -> Self {
        let rps = if requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        Self {
            next_slot: Mutex::new(Instant::now()),
            base_interval_nanos: AtomicU64::new(Duration::from_secs_f64(1.0 / rps).as_nanos() as u64),
            jitter_fraction: jitter_fraction.clamp(0.0, 0.99),
            grants: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
        }
    }

    /// Create a rate limiter from robots.txt crawl delay.
    ///
    /// The crawl delay only ever slows the configured rate down.
    pub fn from_crawl_delay(
        crawl_delay: Option<f32>,
        requests_per_second: f64,
        jitter_fraction: f64,
    ) -> Self {
        let rps = match crawl_delay {
            Some(delay) if delay > 0.0 => requests_per_second.min(1.0 / delay as f64),
            _ => requests_per_second,
        };
        Self::new(rps, jitter_fraction)
    }

    /// Slow an existing limiter down to a robots.txt crawl delay.
    ///
    /// Returns true if the pace changed. A delay looser than the current
    /// interval is ignored.
    pub fn apply_crawl_delay(&self, crawl_delay: Option<f32>) -> bool {
        let Some(delay) = crawl_delay.filter(|d| *d > 0.0) else {
            return false;
        };
        let wanted = Duration::from_secs_f64(delay as f64).as_nanos() as u64;
        let previous = self.base_interval_nanos.fetch_max(wanted, Ordering::Relaxed);
        if wanted > previous {
            info!(crawl_delay_ms = wanted / 1_000_000, "robots.txt crawl delay slows request rate");
            true
        } else {
            false
        }
    }

    /// Wait until it is safe to issue the next request.
    ///
    /// The slot is reserved under the lock; the wait happens after the lock
    /// is released so other callers can queue up behind it.
    pub async fn acquire(&self, retry_after: Option<Duration>) {
        let grant_at = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            if let Some(hint) = retry_after {
                self.backpressure_events.fetch_add(1, Ordering::Relaxed);
                let pushed = now.checked_add(hint).unwrap_or_else(|| far_future(now));
                if pushed > *next_slot {
                    *next_slot = pushed;
                }
            }
            let grant_at = (*next_slot).max(now);
            let interval = self
                .base_interval()
                .mul_f64(jitter_factor(self.jitter_fraction));
            *next_slot = grant_at
                .checked_add(interval)
                .unwrap_or_else(|| far_future(grant_at));
            grant_at
        };

        let wait = grant_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!(delay_ms = wait.as_millis() as u64, "rate limiter waiting");
        }
        tokio::time::sleep_until(grant_at).await;
        self.grants.fetch_add(1, Ordering::Relaxed);
    }

    /// Nominal gap between permits.
    pub fn base_interval(&self) -> Duration {
        Duration::from_nanos(self.base_interval_nanos.load(Ordering::Relaxed))
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Smallest gap two consecutive permits can have.
    pub fn min_interval(&self) -> Duration {
        self.base_interval().mul_f64(1.0 - self.jitter_fraction)
    }

    /// Permits handed out so far.
    pub fn grants(&self) -> u64 {
        self.grants.load(Ordering::Relaxed)
    }

    /// Number of server-directed pushbacks received.
    pub fn backpressure_events(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Latest instant the timer can represent without overflowing.
fn far_future(from: Instant) -> Instant {
    const CEILING: Duration = Duration::from_secs(86_400 * 365 * 30);
    from.checked_add(CEILING).unwrap_or(from)
}
