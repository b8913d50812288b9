//! Run configuration, loadable from a JSON file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry and response-viability settings for the fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Ceiling for a server-sent `Retry-After` wait.
    pub max_retry_after_ms: u64,
    /// 200 responses shorter than this are treated as transient anomalies.
    pub min_body_bytes: usize,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_retry_after_ms: 300_000,
            min_body_bytes: 1000,
            retryable_statuses: vec![408, 425, 429, 500, 502, 503, 504],
        }
    }
}

/// Pattern learning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// URLs validated before the first template check.
    pub initial_sample: usize,
    /// Cumulative validated-URL counts for each expansion round.
    pub expansion_steps: Vec<usize>,
    /// Leading sitemap entries deprioritised when sampling.
    pub skip_leading: usize,
    /// Above this many candidates, full validation is not attempted.
    pub full_validation_limit: usize,
    /// Percentage points added to every template threshold per expansion round.
    pub threshold_step: f64,
    /// Minimum share of matched sample URLs that must be products.
    pub min_precision: f64,
    /// Concurrent validation probes.
    pub concurrency: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            initial_sample: 20,
            expansion_steps: vec![50, 500],
            skip_leading: 10,
            full_validation_limit: 5000,
            threshold_step: 5.0,
            min_precision: 0.8,
            concurrency: 4,
        }
    }
}

/// Top-level configuration for one pipeline run against one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub requests_per_second: f64,
    pub jitter_fraction: f64,
    /// Extraction worker pool size.
    pub concurrency: usize,
    pub request_timeout_ms: u64,
    /// Optional wall-clock budget for the whole run.
    pub run_deadline_secs: Option<u64>,
    /// Stop the run once the error ratio exceeds this (checked after 20 URLs).
    pub failure_threshold: Option<f64>,
    pub max_images: usize,
    pub max_category_pages: usize,
    /// Drop candidates disallowed by robots.txt and honour its Crawl-delay.
    pub respect_robots: bool,
    pub retry: RetryConfig,
    pub learner: LearnerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            jitter_fraction: 0.2,
            concurrency: 5,
            request_timeout_ms: 15_000,
            run_deadline_secs: None,
            failure_threshold: None,
            max_images: 10,
            max_category_pages: 5,
            respect_robots: true,
            retry: RetryConfig::default(),
            learner: LearnerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a configuration file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default location: `~/.catalog/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".catalog")
            .join("config.json")
    }

    /// Load from `path` if given, else from the default location if it exists,
    /// else fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }
        let default = Self::default_path();
        if default.exists() {
            Self::load(&default)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.requests_per_second > 0.0) {
            anyhow::bail!("requests_per_second must be positive");
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            anyhow::bail!("jitter_fraction must be in [0, 1)");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.learner.initial_sample == 0 {
            anyhow::bail!("learner.initial_sample must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }
}
