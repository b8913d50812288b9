//! Cartography: where the products are.
//!
//! Sitemap and robots.txt resolution, request pacing, the product URL
//! pattern learner, and fallback discovery for sites without a sitemap.

pub mod crawler;
pub mod learner;
pub mod page_classifier;
pub mod rate_limiter;
pub mod robots;
pub mod sampler;
pub mod sitemap;
pub mod url_classifier;
