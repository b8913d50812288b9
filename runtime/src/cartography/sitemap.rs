//! Sitemap resolution and flattening.
//!
//! Locations come from robots.txt `Sitemap:` lines first, then a fixed list
//! of conventional paths. Gzip bodies are detected by header or magic bytes.
//! A sitemap index is expanded exactly one level, preferring a child whose
//! URL mentions products.

use crate::acquisition::http_client::HttpClient;
use crate::cartography::robots::{self, RobotsRules};
use crate::error::SitemapError;
use crate::types::{CandidateUrl, DiscoverySource};
use flate2::read::GzDecoder;
use fnv::FnvHashSet;
use quick_xml::events::Event;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Conventional sitemap locations, tried after robots.txt directives.
pub const CONVENTIONAL_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemap.xml.gz",
    "/sitemap/sitemap.xml",
    "/product-sitemap.xml",
    "/sitemap_products_1.xml",
];

/// Index children tried before giving up on an index.
const MAX_INDEX_CHILDREN: usize = 3;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A parsed sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>`: page URLs.
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: nested sitemap URLs.
    Index(Vec<String>),
}

/// Parse sitemap XML, with or without namespace prefixes.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let xml = xml.trim_start_matches('\u{feff}');
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root: Option<bool> = None; // Some(true) = index
    let mut depth = 0usize;
    let mut entry_depth: Option<usize> = None;
    let mut in_loc = false;
    let mut current = String::new();
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.local_name();
                match name.as_ref() {
                    b"urlset" if root.is_none() => root = Some(false),
                    b"sitemapindex" if root.is_none() => root = Some(true),
                    b"url" | b"sitemap" => entry_depth = Some(depth),
                    // Only the entry's own <loc>, not <image:loc> and friends
                    b"loc" if entry_depth == Some(depth - 1) => {
                        in_loc = true;
                        current.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| SitemapError::Xml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(c)) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&c));
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"loc" if in_loc => {
                        in_loc = false;
                        let loc = current.trim();
                        if !loc.is_empty() {
                            locs.push(loc.to_string());
                        }
                    }
                    b"url" | b"sitemap" => entry_depth = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SitemapError::Xml(e.to_string())),
            _ => {}
        }
    }

    match root {
        Some(true) => Ok(SitemapDocument::Index(locs)),
        Some(false) => Ok(SitemapDocument::UrlSet(locs)),
        None => Err(SitemapError::NotASitemap),
    }
}

/// Decode a sitemap body, decompressing gzip when flagged or sniffed.
pub fn decode_body(bytes: &[u8], content_encoding: Option<&str>) -> Result<String, SitemapError> {
    // The client may already have inflated a Content-Encoding: gzip body,
    // so the magic bytes decide.
    let flagged = content_encoding
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false);

    if bytes.starts_with(&GZIP_MAGIC) {
        if !flagged {
            debug!(bytes = bytes.len(), "gzip sitemap detected by magic bytes");
        }
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder.read_to_string(&mut out)?;
        return Ok(out);
    }

    String::from_utf8(bytes.to_vec()).map_err(|_| SitemapError::Encoding)
}

/// Order index children: product-looking ones first, otherwise document order.
pub fn rank_index_children(children: &[String]) -> Vec<&String> {
    let (mut product, rest): (Vec<&String>, Vec<&String>) = children
        .iter()
        .partition(|c| c.to_lowercase().contains("product") || c.to_lowercase().contains("produto"));
    product.extend(rest);
    product
}

/// A finite, restartable sequence of deduplicated candidate URLs.
#[derive(Debug, Clone, Default)]
pub struct SitemapUrls {
    urls: Vec<CandidateUrl>,
    /// Sitemap document the URLs came from, if any.
    pub source: Option<String>,
    pub robots: Option<RobotsRules>,
}

impl SitemapUrls {
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Iterate from the start; may be called any number of times.
    pub fn iter(&self) -> std::slice::Iter<'_, CandidateUrl> {
        self.urls.iter()
    }

    pub fn as_slice(&self) -> &[CandidateUrl] {
        &self.urls
    }

    pub fn into_vec(self) -> Vec<CandidateUrl> {
        self.urls
    }
}

impl<'a> IntoIterator for &'a SitemapUrls {
    type Item = &'a CandidateUrl;
    type IntoIter = std::slice::Iter<'a, CandidateUrl>;

    fn into_iter(self) -> Self::IntoIter {
        self.urls.iter()
    }
}

/// Deduplicate by normalised URL, keeping first occurrence order.
pub fn dedupe(urls: impl IntoIterator<Item = CandidateUrl>) -> Vec<CandidateUrl> {
    let mut seen = FnvHashSet::default();
    urls.into_iter()
        .filter(|c| seen.insert(c.normalized()))
        .collect()
}

/// Resolves and flattens the sitemap(s) of one site.
pub struct SitemapCollector {
    client: Arc<HttpClient>,
    respect_robots: bool,
}

impl SitemapCollector {
    pub fn new(client: Arc<HttpClient>, respect_robots: bool) -> Self {
        Self {
            client,
            respect_robots,
        }
    }

    /// Fetch and parse robots.txt. `None` when unreachable.
    pub async fn fetch_robots(&self, base_url: &Url) -> Option<RobotsRules> {
        let url = base_url.join("/robots.txt").ok()?;
        let result = self.client.fetch_document(url.as_str()).await;
        let text = result.text()?;
        Some(robots::parse_robots(&text, "catalog"))
    }

    /// Sitemap locations in the order they will be tried.
    pub fn candidate_locations(base_url: &Url, robots: Option<&RobotsRules>) -> Vec<String> {
        let mut locations: Vec<String> = robots.map(|r| r.sitemaps.clone()).unwrap_or_default();
        for path in CONVENTIONAL_PATHS {
            if let Ok(url) = base_url.join(path) {
                let url = url.to_string();
                if !locations.contains(&url) {
                    locations.push(url);
                }
            }
        }
        locations
    }

    /// Resolve the site's sitemap and return its page URLs.
    ///
    /// Returns an empty sequence when no sitemap is reachable; the caller is
    /// expected to fall back to another discovery strategy.
    pub async fn collect(&self, base_url: &Url) -> SitemapUrls {
        let robots = self.fetch_robots(base_url).await;
        let locations = Self::candidate_locations(base_url, robots.as_ref());

        for location in &locations {
            let Some(doc) = self.fetch_sitemap(location).await else {
                continue;
            };

            let page_urls = match doc {
                SitemapDocument::UrlSet(urls) => urls,
                SitemapDocument::Index(children) => {
                    match self.expand_index(&children).await {
                        Some(urls) => urls,
                        None => continue,
                    }
                }
            };

            if page_urls.is_empty() {
                debug!(location, "sitemap has no page URLs");
                continue;
            }

            let candidates = page_urls
                .into_iter()
                .filter(|u| {
                    !self.respect_robots
                        || robots.as_ref().map(|r| r.is_url_allowed(u)).unwrap_or(true)
                })
                .map(|u| CandidateUrl::new(u, DiscoverySource::Sitemap));
            let urls = dedupe(candidates);

            info!(location, count = urls.len(), "collected sitemap URLs");
            return SitemapUrls {
                urls,
                source: Some(location.clone()),
                robots,
            };
        }

        warn!(base = %base_url, "no sitemap reachable");
        SitemapUrls {
            robots,
            ..Default::default()
        }
    }

    /// Expand an index one level: try ranked children, stop at the first
    /// one that yields page URLs. Nested indexes are not followed.
    async fn expand_index(&self, children: &[String]) -> Option<Vec<String>> {
        for child in rank_index_children(children)
            .into_iter()
            .take(MAX_INDEX_CHILDREN)
        {
            match self.fetch_sitemap(child).await {
                Some(SitemapDocument::UrlSet(urls)) if !urls.is_empty() => {
                    debug!(child = %child, count = urls.len(), "expanded sitemap index child");
                    return Some(urls);
                }
                Some(SitemapDocument::Index(_)) => {
                    debug!(child = %child, "nested index not expanded");
                }
                _ => {}
            }
        }
        None
    }

    async fn fetch_sitemap(&self, url: &str) -> Option<SitemapDocument> {
        let result = self.client.fetch_document(url).await;
        let bytes = result.body.as_deref()?;
        let xml = match decode_body(bytes, result.content_encoding.as_deref()) {
            Ok(xml) => xml,
            Err(e) => {
                debug!(url, error = %e, "sitemap decode failed");
                return None;
            }
        };
        match parse_sitemap(&xml) {
            Ok(doc) => Some(doc),
            Err(e) => {
                debug!(url, error = %e, "sitemap parse failed");
                None
            }
        }
    }
}
