//! Sitemap-driven product catalog harvester.
//!
//! Learns which URLs of a storefront are product pages from a handful of
//! validated probes, then fetches and extracts structured product records
//! from every one of them under a polite, server-aware request pace.

pub mod acquisition;
pub mod audit;
pub mod cartography;
pub mod cli;
pub mod config;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod renderer;
pub mod stealth;
pub mod types;

pub use config::PipelineConfig;
pub use error::{ErrorClass, ErrorKind, PipelineError};
pub use pipeline::Pipeline;
pub use types::{CandidateUrl, ExtractedProduct};
