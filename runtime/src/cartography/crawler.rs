//! Fallback discovery for sites without a usable sitemap.
//!
//! One homepage fetch plus a handful of category pages. No deeper traversal.

use crate::acquisition::http_client::HttpClient;
use crate::cartography::robots::RobotsRules;
use crate::cartography::sitemap::dedupe;
use crate::cartography::url_classifier::{self, normalize_url};
use crate::types::{CandidateUrl, DiscoverySource};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

static LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Alternate candidate source used when sitemap learning cannot answer.
#[async_trait]
pub trait FallbackDiscovery: Send + Sync {
    async fn discover(&self, base_url: &Url) -> Vec<CandidateUrl>;
}

/// Homepage links, then the links of up to `max_category_pages` category pages.
pub struct HomepageDiscovery {
    client: Arc<HttpClient>,
    max_category_pages: usize,
    robots: Option<RobotsRules>,
}

impl HomepageDiscovery {
    pub fn new(client: Arc<HttpClient>, max_category_pages: usize) -> Self {
        Self {
            client,
            max_category_pages,
            robots: None,
        }
    }

    /// Drop links the site's robots.txt disallows.
    pub fn with_robots(mut self, robots: Option<RobotsRules>) -> Self {
        self.robots = robots;
        self
    }

    fn allowed(&self, url: &str) -> bool {
        self.robots
            .as_ref()
            .map(|r| r.is_url_allowed(url))
            .unwrap_or(true)
    }

    async fn page_links(&self, url: &str) -> Vec<String> {
        let result = self.client.fetch(url).await;
        match result.text() {
            Some(body) => {
                let base = result.final_url.as_deref().unwrap_or(url);
                extract_links(&body, base)
                    .into_iter()
                    .filter(|l| self.allowed(l))
                    .collect()
            }
            None => {
                warn!(url, error = ?result.error, "fallback page fetch failed");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl FallbackDiscovery for HomepageDiscovery {
    async fn discover(&self, base_url: &Url) -> Vec<CandidateUrl> {
        let home = base_url.as_str();
        let home_key = normalize_url(home);
        let links = self.page_links(home).await;

        let categories = pick_category_pages(&links, self.max_category_pages);
        debug!(links = links.len(), categories = categories.len(), "homepage scanned");

        let mut found: Vec<CandidateUrl> = links
            .iter()
            .map(|l| CandidateUrl::new(l.clone(), DiscoverySource::Homepage))
            .collect();

        for category in &categories {
            let links = self.page_links(category).await;
            found.extend(
                links
                    .into_iter()
                    .map(|l| CandidateUrl::new(l, DiscoverySource::Category)),
            );
        }

        let found: Vec<CandidateUrl> = dedupe(found)
            .into_iter()
            .filter(|c| c.normalized() != home_key)
            .collect();
        info!(count = found.len(), "fallback discovery finished");
        found
    }
}

/// Same-host absolute links from `html`, fragment stripped, document order,
/// no duplicates.
pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut out: Vec<String> = Vec::new();

    for a in doc.select(&LINKS) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
        {
            continue;
        }
        let Ok(mut url) = base.join(href) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") || url.host_str() != base.host_str() {
            continue;
        }
        url.set_fragment(None);
        let url = url.to_string();
        if !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

/// Category-looking links first, then shallow one-segment links.
pub fn pick_category_pages(links: &[String], max: usize) -> Vec<String> {
    let mut picked: Vec<String> = links
        .iter()
        .filter(|l| url_classifier::has_category_segment(l))
        .take(max)
        .cloned()
        .collect();

    if picked.len() < max {
        let room = max - picked.len();
        let shallow: Vec<String> = links
            .iter()
            .filter(|l| {
                let path = url_classifier::url_path(l);
                let segments = path.split('/').filter(|s| !s.is_empty()).count();
                segments == 1
                    && !path.chars().any(|c| c.is_ascii_digit())
                    && !url_classifier::has_product_segment(l)
                    && !picked.contains(l)
            })
            .take(room)
            .cloned()
            .collect();
        picked.extend(shallow);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::retry::RetryPolicy;
    use crate::cartography::rate_limiter::RateLimiter;
    use crate::cartography::robots::parse_robots;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_links() {
        let html = r##"<a href="/produto/a-1">A</a>
<a href="https://shop.com/produto/b-2#reviews">B</a>
<a href="https://other.com/x">ext</a>
<a href="#top">top</a>
<a href="mailto:sac@shop.com">mail</a>
<a href="/produto/a-1">dup</a>"##;
        let links = extract_links(html, "https://shop.com/");
        assert_eq!(
            links,
            vec![
                "https://shop.com/produto/a-1".to_string(),
                "https://shop.com/produto/b-2".to_string(),
            ]
        );
    }

    #[test]
    fn test_pick_category_pages() {
        let links: Vec<String> = [
            "https://shop.com/produto/a-1",
            "https://shop.com/categoria/tenis",
            "https://shop.com/masculino",
            "https://shop.com/ofertas-2024",
            "https://shop.com/collections/verao",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            pick_category_pages(&links, 3),
            vec![
                "https://shop.com/categoria/tenis".to_string(),
                "https://shop.com/collections/verao".to_string(),
                "https://shop.com/masculino".to_string(),
            ]
        );
        assert_eq!(pick_category_pages(&links, 1).len(), 1);
    }

    fn page(links: &str) -> String {
        format!("<html><body>{links}{}</body></html>", "<p>conteúdo</p>".repeat(100))
    }

    #[tokio::test]
    async fn test_homepage_discovery() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                r#"<a href="/">home</a><a href="/categoria/tenis">Tênis</a>
                   <a href="/produto/destaque-1">Destaque</a><a href="/checkout">Carrinho</a>"#,
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/categoria/tenis"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page(
                r#"<a href="/produto/tenis-2">T2</a><a href="/produto/destaque-1">D</a>"#,
            )))
            .mount(&server)
            .await;

        let limiter = Arc::new(RateLimiter::new(1000.0, 0.0));
        let base_url = Url::parse(&base).unwrap();
        let client = Arc::new(
            HttpClient::new(&base_url, limiter, RetryPolicy::default(), Duration::from_secs(5))
                .unwrap(),
        );
        let robots = parse_robots("User-agent: *\nDisallow: /checkout\n", "catalog");
        let discovery = HomepageDiscovery::new(client, 5).with_robots(Some(robots));

        let found = discovery.discover(&base_url).await;
        let got: Vec<(String, DiscoverySource)> = found
            .into_iter()
            .map(|c| (c.url.replace(&base, ""), c.discovered_from))
            .collect();

        assert_eq!(
            got,
            vec![
                ("/categoria/tenis".to_string(), DiscoverySource::Homepage),
                ("/produto/destaque-1".to_string(), DiscoverySource::Homepage),
                ("/produto/tenis-2".to_string(), DiscoverySource::Category),
            ]
        );
    }
}
