//! Core data model shared by discovery, learning, fetching, and extraction.

use crate::cartography::url_classifier::normalize_url;
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a candidate URL was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Sitemap,
    Category,
    Homepage,
}

/// A URL that might be a product page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    pub discovered_from: DiscoverySource,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, discovered_from: DiscoverySource) -> Self {
        Self {
            url: url.into(),
            discovered_from,
        }
    }

    /// Deduplication key: query string stripped, trailing slash removed.
    pub fn normalized(&self) -> String {
        normalize_url(&self.url)
    }
}

/// Outcome of probing one URL while learning a pattern.
#[derive(Debug, Clone)]
pub struct ValidationSample {
    pub url: String,
    pub is_product: bool,
    pub http_status: u16,
    pub latency: Duration,
}

/// Result of fetching one URL, after retries.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    /// URL after redirects, when a response was received.
    pub final_url: Option<String>,
    /// Last status received, `0` if no response ever arrived.
    pub status_code: u16,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub elapsed: Duration,
    /// 1-based number of the attempt that produced this result.
    pub attempt: u32,
    pub error: Option<ErrorKind>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.body.is_some()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Tri-state stock signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

impl Availability {
    pub fn is_known(self) -> bool {
        self != Availability::Unknown
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Availability::InStock => Some(true),
            Availability::OutOfStock => Some(false),
            Availability::Unknown => None,
        }
    }
}

/// Extraction strategy, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionSource {
    StructuredData,
    Hydration,
    Metadata,
    Heuristic,
}

impl ExtractionSource {
    pub const CASCADE: [ExtractionSource; 4] = [
        ExtractionSource::StructuredData,
        ExtractionSource::Hydration,
        ExtractionSource::Metadata,
        ExtractionSource::Heuristic,
    ];
}

/// One output record per processed URL. Failures are recorded, not dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub url: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub currency: Option<String>,
    pub brand: Option<String>,
    pub sku: Option<String>,
    pub gtin: Option<String>,
    pub images: Vec<String>,
    pub availability: Availability,
    /// Strategy that supplied the name, if any did.
    pub extraction_source: Option<ExtractionSource>,
    pub error: Option<ErrorKind>,
}

impl ExtractedProduct {
    /// A record for a URL that could not be fetched or was never attempted.
    pub fn failed(url: impl Into<String>, error: ErrorKind) -> Self {
        Self {
            url: url.into(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Name and price both present.
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.price.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_normalized() {
        let c = CandidateUrl::new(
            "https://shop.com/produto/tenis-123/?utm_source=x",
            DiscoverySource::Sitemap,
        );
        assert_eq!(c.normalized(), "https://shop.com/produto/tenis-123");
    }

    #[test]
    fn test_failed_record_keeps_url() {
        let p = ExtractedProduct::failed("https://shop.com/p/1", ErrorKind::Timeout);
        assert_eq!(p.url, "https://shop.com/p/1");
        assert_eq!(p.error, Some(ErrorKind::Timeout));
        assert!(!p.is_complete());
        assert_eq!(p.availability, Availability::Unknown);
    }

    #[test]
    fn test_extraction_source_serializes_kebab() {
        let v = serde_json::to_value(ExtractionSource::StructuredData).unwrap();
        assert_eq!(v, "structured-data");
    }
}
