//! End-of-run accounting.

use crate::cartography::learner::{LearnMode, UrlPattern};
use crate::types::{ExtractedProduct, ExtractionSource};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Aggregate counts over a run's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// URLs that entered the extraction phase.
    pub total: usize,
    /// Records with name and price and no error.
    pub succeeded: usize,
    /// Records carrying any error, incomplete extractions included.
    pub failed: usize,
    pub incomplete: usize,
    pub cancelled: usize,
    /// Error counts keyed by error label.
    pub errors: BTreeMap<String, usize>,
    /// Successful records keyed by the strategy that supplied the name.
    pub sources: BTreeMap<String, usize>,
    /// Records served from the learning-phase cache.
    pub cache_hits: usize,
    /// Pages re-extracted after headless rendering.
    pub rendered: usize,
    pub http_requests: u64,
    pub rate_limited_responses: u64,
}

impl RunStats {
    /// Count one finished record.
    pub fn record(&mut self, product: &ExtractedProduct) {
        self.total += 1;
        match &product.error {
            None => {
                self.succeeded += 1;
                if let Some(source) = product.extraction_source {
                    *self.sources.entry(source_label(source).to_string()).or_default() += 1;
                }
            }
            Some(error) => {
                self.failed += 1;
                *self.errors.entry(error.label().to_string()).or_default() += 1;
                match error {
                    crate::error::ErrorKind::ExtractionIncomplete => self.incomplete += 1,
                    crate::error::ErrorKind::Cancelled => self.cancelled += 1,
                    _ => {}
                }
            }
        }
    }

    /// Share of records with an error other than an incomplete extraction.
    pub fn error_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.failed - self.incomplete) as f64 / self.total as f64
    }
}

fn source_label(source: ExtractionSource) -> &'static str {
    match source {
        ExtractionSource::StructuredData => "structured-data",
        ExtractionSource::Hydration => "hydration",
        ExtractionSource::Metadata => "metadata",
        ExtractionSource::Heuristic => "heuristic",
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub base_url: String,
    /// Sitemap document the candidates came from, if any.
    pub sitemap: Option<String>,
    /// Candidates found before filtering.
    pub discovered: usize,
    pub used_fallback_discovery: bool,
    pub pattern: Option<UrlPattern>,
    pub learn_mode: Option<LearnMode>,
    pub validations: usize,
    pub stats: RunStats,
    #[serde(serialize_with = "duration_ms")]
    pub elapsed: Duration,
    /// One record per filtered URL, in input order.
    #[serde(skip)]
    pub products: Vec<ExtractedProduct>,
}

fn duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
