//! Learn a product URL pattern from a small validated sample.
//!
//! A few candidate URLs are fetched and checked for product content. The
//! structural templates in [`url_classifier`] are then scored against that
//! sample; once one clears its threshold it is applied to the whole list by
//! string matching alone. Without a pattern the learner widens the sample,
//! then falls back to validating every URL when the list is small enough.

use crate::acquisition::http_client::HttpClient;
use crate::cartography::page_classifier;
use crate::cartography::sampler::middle_out_order;
use crate::cartography::url_classifier::{self, UrlTemplate, BUILTIN_TEMPLATES};
use crate::config::LearnerConfig;
use crate::extraction::CascadingExtractor;
use crate::pipeline::cache::ProductCache;
use crate::pipeline::progress::{NoProgress, ProgressEvent, ProgressReporter, RunPhase};
use crate::types::{CandidateUrl, ValidationSample};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Threshold for the template built from the dominant leading path segment.
const PREFIX_TEMPLATE_PERCENT: f64 = 40.0;

// ── Validation ──────────────────────────────────────────────────────────

/// Labels one URL as product or not by looking at the live page.
#[async_trait]
pub trait SampleValidator: Send + Sync {
    async fn validate(&self, url: &str) -> ValidationSample;
}

/// Validator backed by the shared HTTP client. Product pages seen while
/// validating are extracted into the run cache so they are not fetched twice.
pub struct FetchValidator {
    client: Arc<HttpClient>,
    extractor: CascadingExtractor,
    cache: Arc<ProductCache>,
}

impl FetchValidator {
    pub fn new(client: Arc<HttpClient>, extractor: CascadingExtractor, cache: Arc<ProductCache>) -> Self {
        Self {
            client,
            extractor,
            cache,
        }
    }
}

#[async_trait]
impl SampleValidator for FetchValidator {
    async fn validate(&self, url: &str) -> ValidationSample {
        let result = self.client.fetch(url).await;
        let is_product = match result.text() {
            Some(body) => {
                let is_product = page_classifier::is_product_page(&body, url);
                if is_product {
                    self.cache.insert(self.extractor.extract(&body, url));
                }
                is_product
            }
            None => false,
        };

        ValidationSample {
            url: url.to_string(),
            is_product,
            http_status: result.status_code,
            latency: result.elapsed,
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────────

/// An adopted URL pattern.
#[derive(Debug, Clone, Serialize)]
pub struct UrlPattern {
    pub template: String,
    #[serde(serialize_with = "regex_as_str")]
    pub regex: Regex,
    /// Share of the sample that matched the pattern and validated as product.
    pub confidence_percent: f64,
    /// Share of matching sample URLs that validated as product.
    pub precision_percent: f64,
    pub sample_size: usize,
}

impl UrlPattern {
    fn from_template(template: &UrlTemplate, score: &TemplateScore) -> Self {
        Self {
            template: template.name.clone(),
            regex: template.regex.clone(),
            confidence_percent: score.confidence_percent,
            precision_percent: score.precision_percent,
            sample_size: score.sample_size,
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex
            .is_match(&url_classifier::url_path(url).to_lowercase())
    }
}

fn regex_as_str<S: Serializer>(regex: &Regex, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(regex.as_str())
}

/// How the learner reached its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnMode {
    /// Pattern adopted on the initial sample.
    EarlyStop,
    /// Pattern adopted after widening the sample.
    Expanded,
    /// No pattern; every URL was validated.
    FullValidation,
    /// No validated product anywhere in the sample.
    Degenerate,
    /// No pattern and too many URLs to validate them all.
    TooLarge,
    /// Nothing to learn from.
    Empty,
    /// Stopped before finishing. URLs never validated stay in `filtered`
    /// so the run can account for them.
    Cancelled,
}

impl LearnMode {
    /// The caller should try another discovery strategy.
    pub fn needs_fallback(self) -> bool {
        matches!(self, LearnMode::Degenerate | LearnMode::TooLarge | LearnMode::Empty)
    }
}

#[derive(Debug, Clone)]
pub struct LearnResult {
    pub pattern: Option<UrlPattern>,
    /// Product URLs, in input order. After cancellation this also holds
    /// every URL that was never labelled.
    pub filtered: Vec<CandidateUrl>,
    pub mode: LearnMode,
    /// URLs fetched for validation.
    pub validations: usize,
    /// Of those, how many were products.
    pub validated_products: usize,
}

/// Score of one template against the current sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateScore {
    pub matched: usize,
    pub matched_products: usize,
    pub sample_size: usize,
    pub confidence_percent: f64,
    pub precision_percent: f64,
}

/// Score `template` against labelled samples.
pub fn score_template(template: &UrlTemplate, samples: &[ValidationSample]) -> TemplateScore {
    let matched: Vec<&ValidationSample> = samples.iter().filter(|s| template.matches(&s.url)).collect();
    let matched_products = matched.iter().filter(|s| s.is_product).count();
    let n = samples.len().max(1);
    TemplateScore {
        matched: matched.len(),
        matched_products,
        sample_size: samples.len(),
        confidence_percent: matched_products as f64 * 100.0 / n as f64,
        precision_percent: if matched.is_empty() {
            0.0
        } else {
            matched_products as f64 * 100.0 / matched.len() as f64
        },
    }
}

/// Template from the most common leading segment of validated products.
pub fn prefix_template(samples: &[ValidationSample]) -> Option<UrlTemplate> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for s in samples.iter().filter(|s| s.is_product) {
        if let Some(seg) = url_classifier::first_segment(&s.url) {
            *counts.entry(seg).or_default() += 1;
        }
    }
    let (segment, count) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;
    if count < 2 {
        return None;
    }
    UrlTemplate::from_prefix(&segment, PREFIX_TEMPLATE_PERCENT)
}

/// Pick the template to adopt, if any.
///
/// A template qualifies when its confidence reaches its own threshold plus
/// `bump` and its precision reaches `min_precision`. Highest confidence wins;
/// ties go to the template with the longer fixed literal.
pub fn choose_pattern(
    templates: &[UrlTemplate],
    samples: &[ValidationSample],
    bump: f64,
    min_precision: f64,
) -> Option<UrlPattern> {
    let mut best: Option<(&UrlTemplate, TemplateScore)> = None;

    for template in templates {
        let score = score_template(template, samples);
        let qualifies = score.matched_products > 0
            && score.confidence_percent >= template.min_match_percent + bump
            && score.precision_percent >= min_precision * 100.0;
        debug!(
            template = %template.name,
            confidence = score.confidence_percent,
            precision = score.precision_percent,
            qualifies,
            "scored template"
        );
        if !qualifies {
            continue;
        }

        let better = match &best {
            None => true,
            Some((current, current_score)) => {
                score.confidence_percent > current_score.confidence_percent
                    || (score.confidence_percent == current_score.confidence_percent
                        && template.literal_len > current.literal_len)
            }
        };
        if better {
            best = Some((template, score));
        }
    }

    best.map(|(template, score)| UrlPattern::from_template(template, &score))
}

// ── Learner ─────────────────────────────────────────────────────────────

pub struct PatternLearner {
    validator: Arc<dyn SampleValidator>,
    config: LearnerConfig,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl PatternLearner {
    pub fn new(validator: Arc<dyn SampleValidator>, config: LearnerConfig) -> Self {
        Self {
            validator,
            config,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Learn a pattern over `urls` and return the product subset.
    pub async fn learn(&self, urls: &[CandidateUrl]) -> LearnResult {
        if urls.is_empty() {
            return LearnResult {
                pattern: None,
                filtered: Vec::new(),
                mode: LearnMode::Empty,
                validations: 0,
                validated_products: 0,
            };
        }

        let order = middle_out_order(urls.len(), self.config.skip_leading);
        let mut labels: HashMap<usize, bool> = HashMap::new();
        let mut samples: Vec<ValidationSample> = Vec::new();
        let mut cursor = 0usize;

        let mut targets = vec![self.config.initial_sample];
        targets.extend(self.config.expansion_steps.iter().copied());

        for (round, target) in targets.into_iter().enumerate() {
            let target = target.min(urls.len());
            if target <= cursor && round > 0 {
                continue;
            }

            self.validate_batch(urls, &order[cursor..target], &mut labels, &mut samples)
                .await;
            cursor = target;

            if self.cancel.is_cancelled() {
                return self.finish_without_pattern(urls, &labels, samples.len(), LearnMode::Cancelled);
            }

            let bump = round as f64 * self.config.threshold_step;
            let mut templates: Vec<UrlTemplate> = BUILTIN_TEMPLATES.clone();
            templates.extend(prefix_template(&samples));

            if let Some(pattern) =
                choose_pattern(&templates, &samples, bump, self.config.min_precision)
            {
                let mode = if round == 0 {
                    LearnMode::EarlyStop
                } else {
                    LearnMode::Expanded
                };
                info!(
                    template = %pattern.template,
                    confidence = pattern.confidence_percent,
                    sample = pattern.sample_size,
                    ?mode,
                    "adopted URL pattern"
                );
                let filtered = apply_pattern(&pattern, urls, &labels);
                return LearnResult {
                    validations: samples.len(),
                    validated_products: count_products(&labels),
                    pattern: Some(pattern),
                    filtered,
                    mode,
                };
            }

            let products = count_products(&labels);
            if round > 0 && products == 0 {
                warn!(validated = samples.len(), "no product pages in sample");
                return self.finish_without_pattern(urls, &labels, samples.len(), LearnMode::Degenerate);
            }
            if cursor >= urls.len() {
                break;
            }
            debug!(round, validated = samples.len(), products, "no pattern yet, widening sample");
        }

        if count_products(&labels) == 0 {
            warn!(validated = samples.len(), "no product pages in sample");
            return self.finish_without_pattern(urls, &labels, samples.len(), LearnMode::Degenerate);
        }

        if urls.len() > self.config.full_validation_limit {
            warn!(
                urls = urls.len(),
                limit = self.config.full_validation_limit,
                "no pattern and too many URLs to validate individually"
            );
            return self.finish_without_pattern(urls, &labels, samples.len(), LearnMode::TooLarge);
        }

        info!(remaining = urls.len() - cursor, "no pattern found, validating every URL");
        self.validate_batch(urls, &order[cursor..], &mut labels, &mut samples)
            .await;
        let mode = if self.cancel.is_cancelled() {
            LearnMode::Cancelled
        } else {
            LearnMode::FullValidation
        };
        self.finish_without_pattern(urls, &labels, samples.len(), mode)
    }

    /// Validate the URLs at `indices` concurrently, recording labels.
    async fn validate_batch(
        &self,
        urls: &[CandidateUrl],
        indices: &[usize],
        labels: &mut HashMap<usize, bool>,
        samples: &mut Vec<ValidationSample>,
    ) {
        let total = urls.len();
        let validator = &self.validator;
        let cancel = &self.cancel;

        let mut results = stream::iter(indices.iter().copied())
            .map(|idx| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((idx, validator.validate(&urls[idx].url).await))
            })
            .buffered(self.config.concurrency.max(1));

        while let Some(result) = results.next().await {
            let Some((idx, sample)) = result else {
                continue;
            };
            debug!(url = %sample.url, is_product = sample.is_product, status = sample.http_status, "validated sample");
            labels.insert(idx, sample.is_product);
            samples.push(sample);
            self.progress.report(ProgressEvent::new(
                RunPhase::Learning,
                samples.len(),
                total,
            ));
        }
    }

    fn finish_without_pattern(
        &self,
        urls: &[CandidateUrl],
        labels: &HashMap<usize, bool>,
        validations: usize,
        mode: LearnMode,
    ) -> LearnResult {
        let keep_unlabelled = mode == LearnMode::Cancelled;
        let filtered = urls
            .iter()
            .enumerate()
            .filter(|(idx, _)| match labels.get(idx) {
                Some(&is_product) => is_product,
                None => keep_unlabelled,
            })
            .map(|(_, candidate)| candidate.clone())
            .collect();

        LearnResult {
            pattern: None,
            filtered,
            mode,
            validations,
            validated_products: count_products(labels),
        }
    }
}

fn count_products(labels: &HashMap<usize, bool>) -> usize {
    labels.values().filter(|&&p| p).count()
}

/// Apply an adopted pattern: validated URLs keep their label, the rest are
/// classified by the pattern alone. Input order is preserved.
pub fn apply_pattern(
    pattern: &UrlPattern,
    urls: &[CandidateUrl],
    labels: &HashMap<usize, bool>,
) -> Vec<CandidateUrl> {
    urls.par_iter()
        .enumerate()
        .filter(|(idx, candidate)| match labels.get(idx) {
            Some(&is_product) => is_product,
            None => pattern.matches(&candidate.url),
        })
        .map(|(_, candidate)| candidate.clone())
        .collect()
}
