//! Error taxonomy for fetch, sitemap, and pipeline failures.
//!
//! Per-URL failures never abort a run. They are carried as an [`ErrorKind`]
//! on the `ExtractedProduct` that the URL produced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal outcome recorded against a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The server kept answering 429 until the retry budget ran out.
    #[error("rate limited")]
    RateLimited,
    /// A non-200 status that was either terminal or retried to exhaustion.
    #[error("HTTP error {code}")]
    HttpError { code: u16 },
    /// The per-request timeout fired on every attempt.
    #[error("request timed out")]
    Timeout,
    /// 200 responses whose body was below the minimum viable size.
    #[error("empty or truncated body")]
    EmptyBody,
    /// Connection-level failure (DNS, TLS, reset).
    #[error("network error: {message}")]
    Network { message: String },
    /// The URL could not be parsed or requested at all.
    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },
    /// The unit was never started because the run was stopped.
    #[error("cancelled")]
    Cancelled,
    /// The page was fetched but no strategy produced both a name and a price.
    #[error("extraction incomplete")]
    ExtractionIncomplete,
}

/// Coarse error classes used for retry decisions and run health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimited,
    Transient,
    Permanent,
    ExtractionIncomplete,
    Cancelled,
}

impl ErrorKind {
    /// Which taxonomy class this outcome belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::RateLimited => ErrorClass::RateLimited,
            ErrorKind::Timeout | ErrorKind::EmptyBody | ErrorKind::Network { .. } => {
                ErrorClass::Transient
            }
            ErrorKind::HttpError { code } if *code >= 500 || *code == 408 || *code == 425 => {
                ErrorClass::Transient
            }
            ErrorKind::HttpError { .. } | ErrorKind::InvalidUrl { .. } => ErrorClass::Permanent,
            ErrorKind::Cancelled => ErrorClass::Cancelled,
            ErrorKind::ExtractionIncomplete => ErrorClass::ExtractionIncomplete,
        }
    }

    /// Short stable label, used as a key in run statistics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::HttpError { .. } => "http_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::EmptyBody => "empty_body",
            ErrorKind::Network { .. } => "network",
            ErrorKind::InvalidUrl { .. } => "invalid_url",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ExtractionIncomplete => "extraction_incomplete",
        }
    }
}

/// Failures while decoding or parsing a sitemap document.
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("gzip decompression failed: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("sitemap body is not valid UTF-8")]
    Encoding,

    #[error("malformed sitemap XML: {0}")]
    Xml(String),

    #[error("document has no <urlset> or <sitemapindex> root")]
    NotASitemap,
}

/// Failures that prevent a pipeline from being constructed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(ErrorKind::RateLimited.class(), ErrorClass::RateLimited);
        assert_eq!(ErrorKind::Timeout.class(), ErrorClass::Transient);
        assert_eq!(ErrorKind::EmptyBody.class(), ErrorClass::Transient);
        assert_eq!(
            ErrorKind::HttpError { code: 503 }.class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ErrorKind::HttpError { code: 404 }.class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            ErrorKind::InvalidUrl {
                message: "nope".into()
            }
            .class(),
            ErrorClass::Permanent
        );
        assert_eq!(ErrorKind::Cancelled.class(), ErrorClass::Cancelled);
    }

    #[test]
    fn test_error_kind_serializes_tagged() {
        let json = serde_json::to_value(ErrorKind::HttpError { code: 410 }).unwrap();
        assert_eq!(json["kind"], "http_error");
        assert_eq!(json["code"], 410);
    }
}
