//! Run orchestration.
//!
//! One run walks `Discovering → Learning → Filtering → Extracting → Done`
//! against a single host. Every component shares one [`HttpClient`] and so
//! one [`RateLimiter`]. Every URL that reaches the extraction phase yields
//! exactly one [`ExtractedProduct`], failures and cancellations included.

pub mod cache;
pub mod progress;
pub mod report;

use crate::acquisition::http_client::HttpClient;
use crate::acquisition::retry::RetryPolicy;
use crate::cartography::crawler::{FallbackDiscovery, HomepageDiscovery};
use crate::cartography::learner::{FetchValidator, LearnResult, PatternLearner};
use crate::cartography::rate_limiter::RateLimiter;
use crate::cartography::robots::RobotsRules;
use crate::cartography::sitemap::{dedupe, SitemapCollector};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::extraction::CascadingExtractor;
use crate::renderer::{looks_js_rendered, PageRenderer};
use crate::types::{CandidateUrl, ExtractedProduct};
use cache::ProductCache;
use futures::stream::{self, StreamExt};
use progress::{NoProgress, ProgressEvent, ProgressReporter, RunPhase};
use report::{RunReport, RunStats};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// The failure threshold is not evaluated before this many URLs finished.
const MIN_PROCESSED_FOR_THRESHOLD: usize = 20;

/// Candidate URLs found for a site, before learning.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub candidates: Vec<CandidateUrl>,
    /// Sitemap document the candidates came from.
    pub sitemap: Option<String>,
    pub robots: Option<RobotsRules>,
}

/// Outcome of the learning phase, fallback discovery included.
#[derive(Debug, Clone)]
pub struct Selection {
    pub learned: LearnResult,
    /// Candidates seen across every discovery source.
    pub discovered: usize,
    pub used_fallback: bool,
}

/// Where an extraction-phase record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Cached,
    Fetched,
    Rendered,
    Skipped,
}

/// Product harvest for one site.
pub struct Pipeline {
    base_url: Url,
    config: PipelineConfig,
    client: Arc<HttpClient>,
    extractor: CascadingExtractor,
    cache: Arc<ProductCache>,
    progress: Arc<dyn ProgressReporter>,
    renderer: Option<Arc<dyn PageRenderer>>,
    fallback: Option<Arc<dyn FallbackDiscovery>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline for `base_url`. Nothing is fetched until a phase runs.
    pub fn new(base_url: &str, config: PipelineConfig) -> Result<Self, PipelineError> {
        let base_url = parse_base_url(base_url)?;
        let limiter = Arc::new(RateLimiter::new(
            config.requests_per_second,
            config.jitter_fraction,
        ));
        let client = HttpClient::new(
            &base_url,
            limiter,
            RetryPolicy::from_config(&config.retry),
            config.request_timeout(),
        )?;

        Ok(Self {
            extractor: CascadingExtractor::new(config.max_images),
            client: Arc::new(client),
            cache: Arc::new(ProductCache::new()),
            progress: Arc::new(NoProgress),
            renderer: None,
            fallback: None,
            cancel: CancellationToken::new(),
            base_url,
            config,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Re-render JS shells through `renderer` when the cascade finds no name.
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replace the default homepage/category discovery.
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackDiscovery>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Cancelling this token stops new work; in-flight fetches finish and
    /// every unstarted URL is recorded as [`ErrorKind::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client(&self) -> &Arc<HttpClient> {
        &self.client
    }

    // ── Phases ──────────────────────────────────────────────────────────

    /// Collect sitemap candidates. Applies the robots.txt crawl delay.
    pub async fn discover(&self) -> Discovery {
        self.progress
            .report(ProgressEvent::entered(RunPhase::Discovering, 0));

        let collector = SitemapCollector::new(Arc::clone(&self.client), self.config.respect_robots);
        let collected = collector.collect(&self.base_url).await;

        if self.config.respect_robots {
            if let Some(robots) = &collected.robots {
                self.client.limiter().apply_crawl_delay(robots.crawl_delay);
            }
        }

        let sitemap = collected.source.clone();
        let robots = collected.robots.clone();
        Discovery {
            candidates: collected.into_vec(),
            sitemap,
            robots,
        }
    }

    /// Learn the product subset of the discovered candidates, falling back
    /// to homepage/category discovery when learning cannot answer.
    pub async fn select(&self, discovery: &Discovery) -> Selection {
        let mut discovered = discovery.candidates.len();
        let mut learned = self.learn(&discovery.candidates).await;
        let mut used_fallback = false;

        if learned.mode.needs_fallback() && !self.cancel.is_cancelled() {
            info!(mode = ?learned.mode, "sitemap learning inconclusive, trying fallback discovery");
            used_fallback = true;

            let fallback = self.fallback_discovery(discovery.robots.clone());
            let extra = fallback.discover(&self.base_url).await;
            if extra.is_empty() {
                warn!("fallback discovery found no candidates");
            } else {
                discovered += extra.len();
                let second = self.learn(&extra).await;
                learned = LearnResult {
                    filtered: dedupe(learned.filtered.into_iter().chain(second.filtered)),
                    validations: learned.validations + second.validations,
                    validated_products: learned.validated_products + second.validated_products,
                    pattern: second.pattern,
                    mode: second.mode,
                };
            }
        }

        if learned.pattern.is_some() {
            self.progress.report(ProgressEvent::new(
                RunPhase::Filtering,
                learned.filtered.len(),
                discovered,
            ));
        }

        Selection {
            learned,
            discovered,
            used_fallback,
        }
    }

    /// Fetch and extract every URL with a bounded worker pool.
    ///
    /// The returned records are in the order of `urls`, one per URL.
    pub async fn extract_all(&self, urls: &[CandidateUrl]) -> (Vec<ExtractedProduct>, RunStats) {
        let total = urls.len();
        self.progress
            .report(ProgressEvent::entered(RunPhase::Extracting, total));

        let mut slots: Vec<Option<ExtractedProduct>> = (0..total).map(|_| None).collect();
        let mut stats = RunStats::default();

        let mut results = stream::iter(urls.iter().enumerate())
            .map(|(idx, candidate)| async move {
                let (product, origin) = self.extract_one(&candidate.url).await;
                (idx, product, origin)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((idx, product, origin)) = results.next().await {
            stats.record(&product);
            match origin {
                Origin::Cached => stats.cache_hits += 1,
                Origin::Rendered => stats.rendered += 1,
                Origin::Fetched | Origin::Skipped => {}
            }
            slots[idx] = Some(product);

            self.progress
                .report(ProgressEvent::new(RunPhase::Extracting, stats.total, total));

            if !self.cancel.is_cancelled()
                && failure_threshold_exceeded(&stats, self.config.failure_threshold)
            {
                warn!(
                    processed = stats.total,
                    error_ratio = stats.error_ratio(),
                    "failure threshold exceeded, stopping run"
                );
                self.cancel.cancel();
            }
        }

        let products = slots
            .into_iter()
            .zip(urls)
            .map(|(slot, candidate)| {
                slot.unwrap_or_else(|| ExtractedProduct::failed(&candidate.url, ErrorKind::Cancelled))
            })
            .collect();
        (products, stats)
    }

    /// Extract a single URL, rendering it if it looks client-side built.
    pub async fn extract_url(&self, url: &str) -> ExtractedProduct {
        self.extract_one(url).await.0
    }

    /// Full run: discover, learn, filter, extract.
    ///
    /// The configured deadline cancels the run rather than aborting it, so
    /// the report still accounts for every filtered URL.
    pub async fn run(&self) -> RunReport {
        let work = self.run_phases();
        tokio::pin!(work);
        tokio::select! {
            report = &mut work => report,
            () = self.deadline_watch() => work.await,
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn run_phases(&self) -> RunReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, base = %self.base_url, "run started");

        let discovery = self.discover().await;
        let Selection {
            learned,
            discovered,
            used_fallback,
        } = self.select(&discovery).await;

        let (products, mut stats) = self.extract_all(&learned.filtered).await;
        stats.http_requests = self.client.requests_sent();
        stats.rate_limited_responses = self.client.throttled_responses();

        self.progress.report(ProgressEvent::new(
            RunPhase::Done,
            products.len(),
            products.len(),
        ));

        let elapsed = started.elapsed();
        info!(
            %run_id,
            total = stats.total,
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            http_requests = stats.http_requests,
            rate_limited = stats.rate_limited_responses,
            elapsed_ms = elapsed.as_millis() as u64,
            "run finished"
        );

        RunReport {
            run_id,
            base_url: self.base_url.to_string(),
            sitemap: discovery.sitemap,
            discovered,
            used_fallback_discovery: used_fallback,
            pattern: learned.pattern,
            learn_mode: Some(learned.mode),
            validations: learned.validations,
            stats,
            elapsed,
            products,
        }
    }

    async fn learn(&self, candidates: &[CandidateUrl]) -> LearnResult {
        self.progress
            .report(ProgressEvent::entered(RunPhase::Learning, candidates.len()));
        let validator = Arc::new(FetchValidator::new(
            Arc::clone(&self.client),
            self.extractor.clone(),
            Arc::clone(&self.cache),
        ));
        PatternLearner::new(validator, self.config.learner.clone())
            .with_progress(Arc::clone(&self.progress))
            .with_cancellation(self.cancel.clone())
            .learn(candidates)
            .await
    }

    fn fallback_discovery(&self, robots: Option<RobotsRules>) -> Arc<dyn FallbackDiscovery> {
        match &self.fallback {
            Some(fallback) => Arc::clone(fallback),
            None => {
                let robots = robots.filter(|_| self.config.respect_robots);
                Arc::new(
                    HomepageDiscovery::new(Arc::clone(&self.client), self.config.max_category_pages)
                        .with_robots(robots),
                )
            }
        }
    }

    async fn extract_one(&self, url: &str) -> (ExtractedProduct, Origin) {
        if let Some(product) = self.cache.take(url) {
            debug!(url, "reusing record from learning phase");
            return (product, Origin::Cached);
        }
        if self.cancel.is_cancelled() {
            return (ExtractedProduct::failed(url, ErrorKind::Cancelled), Origin::Skipped);
        }

        let result = self.client.fetch(url).await;
        let product = match (&result.error, result.text()) {
            (None, Some(body)) => {
                let product = self.extractor.extract(&body, url);
                if product.name.is_some() || !looks_js_rendered(&body) {
                    return (product, Origin::Fetched);
                }
                product
            }
            (Some(ErrorKind::EmptyBody), _) => ExtractedProduct::failed(url, ErrorKind::EmptyBody),
            (Some(error), _) => return (ExtractedProduct::failed(url, error.clone()), Origin::Fetched),
            (None, None) => return (ExtractedProduct::failed(url, ErrorKind::EmptyBody), Origin::Fetched),
        };

        match self.render(url).await {
            Some(rendered) => (rendered, Origin::Rendered),
            None => (product, Origin::Fetched),
        }
    }

    async fn render(&self, url: &str) -> Option<ExtractedProduct> {
        let renderer = self.renderer.as_ref()?;
        debug!(url, "page looks client-rendered, rendering");
        let html = renderer.render(url).await?;
        Some(self.extractor.extract(&html, url))
    }

    async fn deadline_watch(&self) {
        match self.config.run_deadline() {
            Some(deadline) => {
                tokio::time::sleep(deadline).await;
                warn!(deadline_secs = deadline.as_secs(), "run deadline reached, stopping");
                self.cancel.cancel();
            }
            None => std::future::pending().await,
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn failure_threshold_exceeded(stats: &RunStats, threshold: Option<f64>) -> bool {
    match threshold {
        Some(limit) => stats.total >= MIN_PROCESSED_FOR_THRESHOLD && stats.error_ratio() > limit,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartography::learner::LearnMode;
    use crate::types::ExtractionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig {
            requests_per_second: 1000.0,
            jitter_fraction: 0.0,
            request_timeout_ms: 5_000,
            ..Default::default()
        };
        config.retry.max_attempts = 1;
        config.retry.min_body_bytes = 200;
        config
    }

    fn product_page(name: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">
{{"@type":"Product","name":"{name}","offers":{{"price":"99.90","priceCurrency":"BRL"}}}}
</script></head><body><h1>{name}</h1>{}</body></html>"#,
            "<p>Descrição do produto.</p>".repeat(40)
        )
    }

    fn plain_page(title: &str) -> String {
        format!(
            "<html><head><title>{title}</title></head><body>{}</body></html>",
            "<p>Texto institucional sem preço.</p>".repeat(40)
        )
    }

    fn sitemap(base: &str, paths: &[String]) -> String {
        let entries: String = paths
            .iter()
            .map(|p| format!("<url><loc>{base}{p}</loc></url>"))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">{entries}</urlset>"#
        )
    }

    /// 6 institutional pages followed by 24 product pages.
    fn catalog_paths() -> Vec<String> {
        (0..30)
            .map(|i| {
                if i < 6 {
                    format!("/institucional/pagina-{i}")
                } else {
                    format!("/produto/tenis-{i}")
                }
            })
            .collect()
    }

    async fn mount_catalog(server: &MockServer) {
        let paths = catalog_paths();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap(&server.uri(), &paths)))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/produto/tenis-7"))
            .respond_with(ResponseTemplate::new(404))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/produto/tenis-\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Tênis Corrida")))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/institucional/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(plain_page("Sobre")))
            .mount(server)
            .await;
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            Pipeline::new("not a url", PipelineConfig::default()),
            Err(PipelineError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            Pipeline::new("ftp://shop.com", PipelineConfig::default()),
            Err(PipelineError::InvalidBaseUrl { .. })
        ));
        assert!(Pipeline::new("https://shop.com", PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_failure_threshold_waits_for_minimum() {
        let mut stats = RunStats::default();
        for i in 0..10 {
            stats.record(&ExtractedProduct::failed(format!("u{i}"), ErrorKind::Timeout));
        }
        assert!(!failure_threshold_exceeded(&stats, Some(0.5)));
        for i in 10..20 {
            stats.record(&ExtractedProduct::failed(format!("u{i}"), ErrorKind::Timeout));
        }
        assert!(failure_threshold_exceeded(&stats, Some(0.5)));
        assert!(!failure_threshold_exceeded(&stats, None));
    }

    #[tokio::test]
    async fn test_run_accounts_for_every_filtered_url() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let pipeline = Pipeline::new(&server.uri(), test_config()).unwrap();
        let report = pipeline.run().await;

        assert_eq!(report.discovered, 30);
        assert!(!report.used_fallback_discovery);
        assert_eq!(report.learn_mode, Some(crate::cartography::learner::LearnMode::EarlyStop));
        assert_eq!(report.pattern.as_ref().unwrap().template, "produto-slug-id");
        assert_eq!(report.validations, 20);

        // One record per filtered URL, in sitemap order
        assert_eq!(report.products.len(), 24);
        let expected: Vec<String> = (6..30)
            .map(|i| format!("{}/produto/tenis-{i}", server.uri()))
            .collect();
        let got: Vec<String> = report.products.iter().map(|p| p.url.clone()).collect();
        assert_eq!(got, expected);

        assert_eq!(report.stats.total, 24);
        assert_eq!(report.stats.succeeded, 23);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.errors.get("http_error"), Some(&1));
        // Sampled pages came from the learning-phase cache
        assert_eq!(report.stats.cache_hits, 20);
        assert_eq!(
            report.products[0].extraction_source,
            Some(ExtractionSource::StructuredData)
        );
        assert_eq!(
            report.products[1].error,
            Some(ErrorKind::HttpError { code: 404 })
        );
    }

    #[tokio::test]
    async fn test_cancel_marks_remaining_urls() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let mut config = test_config();
        config.concurrency = 1;
        let pipeline = Pipeline::new(&server.uri(), config).unwrap();
        let token = pipeline.cancellation_token();
        let pipeline = pipeline.with_progress(Arc::new(move |event: ProgressEvent| {
            if event.phase == RunPhase::Extracting && event.processed == 1 {
                token.cancel();
            }
        }));

        let report = pipeline.run().await;

        assert_eq!(report.products.len(), 24);
        assert!(report.products[0].error.is_none());
        // Cached records need no new work; everything else is cancelled
        let cancelled = report
            .products
            .iter()
            .filter(|p| p.error == Some(ErrorKind::Cancelled))
            .count();
        assert_eq!(cancelled, 3);
        assert_eq!(report.stats.cancelled, 3);
        assert_eq!(report.stats.total, 24);
    }

    #[tokio::test]
    async fn test_falls_back_to_homepage_without_sitemap() {
        let server = MockServer::start().await;
        let links: String = (1..=5)
            .map(|i| format!(r#"<a href="/produto/caneca-{i}">Caneca {i}</a>"#))
            .collect();
        let homepage = plain_page("Loja").replace("<body>", &format!("<body>{links}"));
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(homepage))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/produto/caneca-\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Caneca")))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(&server.uri(), test_config()).unwrap();
        let report = pipeline.run().await;

        assert!(report.sitemap.is_none());
        assert!(report.used_fallback_discovery);
        assert_eq!(report.discovered, 5);
        assert_eq!(report.products.len(), 5);
        assert_eq!(report.stats.succeeded, 5);
    }

    struct StaticDiscovery(Vec<String>);

    #[async_trait]
    impl FallbackDiscovery for StaticDiscovery {
        async fn discover(&self, _base_url: &Url) -> Vec<CandidateUrl> {
            self.0
                .iter()
                .map(|u| CandidateUrl::new(u.clone(), crate::types::DiscoverySource::Category))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_degenerate_sitemap_uses_custom_fallback() {
        let server = MockServer::start().await;
        let paths: Vec<String> = (0..30).map(|i| format!("/institucional/pagina-{i}")).collect();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap(&server.uri(), &paths)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/institucional/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(plain_page("Sobre")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/produto/bolsa-\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("Bolsa")))
            .mount(&server)
            .await;

        let extra = (1..=3)
            .map(|i| format!("{}/produto/bolsa-{i}", server.uri()))
            .collect();
        let pipeline = Pipeline::new(&server.uri(), test_config())
            .unwrap()
            .with_fallback(Arc::new(StaticDiscovery(extra)));
        let report = pipeline.run().await;

        assert!(report.sitemap.is_some());
        assert!(report.used_fallback_discovery);
        assert_eq!(report.discovered, 33);
        assert_eq!(report.validations, 33);
        assert_eq!(report.products.len(), 3);
        assert!(report.products.iter().all(|p| p.name.as_deref() == Some("Bolsa")));
    }

    struct FixedRenderer {
        html: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageRenderer for FixedRenderer {
        async fn render(&self, _url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(self.html.clone())
        }
    }

    #[tokio::test]
    async fn test_js_shell_is_rendered() {
        let server = MockServer::start().await;
        let shell = format!(
            r#"<html><head><script>{}</script></head><body><div id="root"></div></body></html>"#,
            "var a = 1;".repeat(300)
        );
        Mock::given(method("GET"))
            .and(path("/produto/spa-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(shell))
            .mount(&server)
            .await;

        let renderer = Arc::new(FixedRenderer {
            html: product_page("Relógio"),
            calls: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::new(&server.uri(), test_config())
            .unwrap()
            .with_renderer(renderer.clone());

        let product = pipeline
            .extract_url(&format!("{}/produto/spa-1", server.uri()))
            .await;

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(product.name.as_deref(), Some("Relógio"));
        assert!(product.error.is_none());
    }

    #[tokio::test]
    async fn test_deadline_cancels_run() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/produto/tenis-[6-9]$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page("Lento"))
                    .set_delay(Duration::from_millis(1500)),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let mut config = test_config();
        config.concurrency = 1;
        config.run_deadline_secs = Some(1);
        let pipeline = Pipeline::new(&server.uri(), config).unwrap();
        let report = pipeline.run().await;

        // Every filtered URL is still accounted for
        assert_eq!(report.products.len(), 24);
        assert!(report.stats.cancelled > 0);
    }

    #[tokio::test]
    async fn test_deadline_during_learning_keeps_unvalidated_urls() {
        let server = MockServer::start().await;
        let paths: Vec<String> = (0..40).map(|i| format!("/produto/bota-{i}")).collect();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap(&server.uri(), &paths)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/produto/bota-\d+$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(product_page("Bota"))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let mut config = test_config();
        config.learner.concurrency = 1;
        config.run_deadline_secs = Some(1);
        let pipeline = Pipeline::new(&server.uri(), config).unwrap();
        let report = pipeline.run().await;

        assert_eq!(report.discovered, 40);
        assert_eq!(report.learn_mode, Some(LearnMode::Cancelled));
        assert_eq!(report.products.len(), 40);
        assert!(report.stats.cancelled > 0);
        assert_eq!(report.stats.cancelled + report.stats.cache_hits, 40);
        let urls: Vec<String> = paths.iter().map(|p| format!("{}{p}", server.uri())).collect();
        let got: Vec<String> = report.products.iter().map(|p| p.url.clone()).collect();
        assert_eq!(got, urls);
    }
}
