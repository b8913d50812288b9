//! Cascading product extraction.
//!
//! Strategies run in fixed priority order over one fetched page:
//! JSON-LD, hydration payload, meta tags, then a heuristic HTML scan. Each
//! strategy only fills fields that are still empty, and the cascade stops as
//! soon as the record has both a name and a price.

pub mod heuristic;
pub mod hydration;
pub mod metadata;
pub mod price;
pub mod structured;

use crate::error::ErrorKind;
use crate::types::{Availability, ExtractedProduct, ExtractionSource};
use scraper::Html;
use tracing::debug;
use url::Url;

/// Fields found by one strategy. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialProduct {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub gtin: Option<String>,
    pub images: Vec<String>,
    pub availability: Availability,
}

impl PartialProduct {
    /// Name and price both present.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.price.is_some()
    }

    /// Fill empty fields from `other`. Returns true if this filled the name.
    pub fn fill_from(&mut self, other: PartialProduct) -> bool {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        let filled_name = self.name.is_none() && other.name.is_some();
        fill(&mut self.name, other.name);
        fill(&mut self.price, other.price);
        fill(&mut self.original_price, other.original_price);
        fill(&mut self.currency, other.currency);
        fill(&mut self.brand, other.brand);
        fill(&mut self.sku, other.sku);
        fill(&mut self.gtin, other.gtin);
        if self.images.is_empty() {
            self.images = other.images;
        }
        if !self.availability.is_known() {
            self.availability = other.availability;
        }
        filled_name
    }
}

/// Runs the extraction strategies over a page body.
#[derive(Debug, Clone)]
pub struct CascadingExtractor {
    max_images: usize,
}

impl Default for CascadingExtractor {
    fn default() -> Self {
        Self::new(10)
    }
}

impl CascadingExtractor {
    pub fn new(max_images: usize) -> Self {
        Self { max_images }
    }

    /// Extract a product record from `body`. Never fails; a record missing a
    /// name or price carries [`ErrorKind::ExtractionIncomplete`].
    pub fn extract(&self, body: &str, url: &str) -> ExtractedProduct {
        let doc = Html::parse_document(body);
        let mut merged = PartialProduct::default();
        let mut name_source = None;

        for source in ExtractionSource::CASCADE {
            let found = match source {
                ExtractionSource::StructuredData => structured::extract(&doc),
                ExtractionSource::Hydration => hydration::extract(body),
                ExtractionSource::Metadata => metadata::extract(&doc),
                ExtractionSource::Heuristic => heuristic::extract(&doc, url),
            };
            if merged.fill_from(found) {
                name_source = Some(source);
            }
            if merged.is_complete() {
                debug!(url, source = ?source, "extraction complete");
                break;
            }
        }

        self.finish(merged, name_source, url)
    }

    fn finish(
        &self,
        partial: PartialProduct,
        name_source: Option<ExtractionSource>,
        url: &str,
    ) -> ExtractedProduct {
        let error = (!partial.is_complete()).then_some(ErrorKind::ExtractionIncomplete);
        if error.is_some() {
            debug!(url, has_name = partial.name.is_some(), has_price = partial.price.is_some(), "extraction incomplete");
        }

        ExtractedProduct {
            url: url.to_string(),
            images: resolve_images(url, partial.images, self.max_images),
            name: partial.name,
            price: partial.price,
            original_price: partial.original_price,
            currency: partial.currency,
            brand: partial.brand,
            sku: partial.sku,
            gtin: partial.gtin,
            availability: partial.availability,
            extraction_source: name_source,
            error,
        }
    }
}

/// Absolute, deduplicated, capped image list. Unresolvable entries are dropped.
fn resolve_images(page_url: &str, images: Vec<String>, max: usize) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let mut out: Vec<String> = Vec::new();
    for raw in images {
        if out.len() >= max {
            break;
        }
        let resolved = match &base {
            Some(base) => base.join(&raw).map(|u| u.to_string()).ok(),
            None => Url::parse(&raw).map(|u| u.to_string()).ok(),
        };
        if let Some(url) = resolved {
            if !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}
