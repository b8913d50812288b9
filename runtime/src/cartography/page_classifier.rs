//! Decide whether a fetched page is a product detail page.
//!
//! This is the content check used while learning URL patterns. It looks at
//! the page itself, never only at the URL shape.

use crate::cartography::url_classifier;
use crate::extraction::metadata::meta_tags;
use crate::extraction::price::PRICE_TOKEN;
use crate::extraction::structured::{find_product, json_ld_blocks};
use scraper::Html;
use serde::{Deserialize, Serialize};

/// Price tokens above this count suggest a listing, not a single product.
const MAX_PRODUCT_PRICE_TOKENS: usize = 12;

const BUY_MARKERS: &[&str] = &[
    "comprar",
    "adicionar ao carrinho",
    "adicionar à sacola",
    "add to cart",
    "add to bag",
    "buy now",
    "añadir al carrito",
];

/// Coarse page kind as seen by the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Product,
    Listing,
    Other,
}

/// Classify a page. Returns (kind, confidence).
pub fn classify_page(body: &str, url: &str) -> (PageKind, f32) {
    let doc = Html::parse_document(body);

    // 1. Structured product data
    let blocks = json_ld_blocks(&doc);
    if blocks.iter().any(|b| find_product(b).is_some()) {
        return (PageKind::Product, 0.95);
    }

    // 2. OpenGraph type
    let tags = meta_tags(&doc);
    let og_type = tags
        .get("og:type")
        .and_then(|v| v.first())
        .map(|t| t.to_lowercase());
    if let Some(t) = og_type.as_deref() {
        if t == "product" || t == "og:product" || t.starts_with("product.") {
            return (PageKind::Product, 0.9);
        }
    }
    if tags.contains_key("product:price:amount") {
        return (PageKind::Product, 0.85);
    }

    // 3. Price tokens plus a purchase affordance or a product path segment
    let lower = body.to_lowercase();
    let price_count = PRICE_TOKEN.find_iter(body).take(MAX_PRODUCT_PRICE_TOKENS + 1).count();
    if price_count > MAX_PRODUCT_PRICE_TOKENS {
        return (PageKind::Listing, 0.6);
    }
    if price_count > 0 {
        let has_buy = BUY_MARKERS.iter().any(|m| lower.contains(m));
        let has_segment = url_classifier::has_product_segment(url);
        match (has_buy, has_segment) {
            (true, true) => return (PageKind::Product, 0.8),
            (true, false) | (false, true) => return (PageKind::Product, 0.65),
            (false, false) => {}
        }
    }

    if url_classifier::has_category_segment(url) {
        return (PageKind::Listing, 0.5);
    }

    (PageKind::Other, 0.5)
}

/// Content-based product check used to label learning samples.
pub fn is_product_page(body: &str, url: &str) -> bool {
    classify_page(body, url).0 == PageKind::Product
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_ld_product() {
        let html = r#"<script type="application/ld+json">{"@type":"Product","name":"X"}</script>"#;
        assert_eq!(classify_page(html, "https://x.com/anything").0, PageKind::Product);
    }

    #[test]
    fn test_og_type_product() {
        let html = r#"<html><head><meta property="og:type" content="product"></head></html>"#;
        assert!(is_product_page(html, "https://x.com/a"));
    }

    #[test]
    fn test_price_with_buy_button() {
        let html = "<html><body><p>R$ 49,90</p><button>Comprar</button></body></html>";
        let (kind, conf) = classify_page(html, "https://x.com/produto/caneca-1");
        assert_eq!(kind, PageKind::Product);
        assert!(conf >= 0.8);
    }

    #[test]
    fn test_price_alone_is_not_enough() {
        let html = "<html><body><p>Frete grátis acima de R$ 199,00</p></body></html>";
        assert!(!is_product_page(html, "https://x.com/institucional/frete"));
    }

    #[test]
    fn test_many_prices_is_listing() {
        let items: String = (1..=20)
            .map(|i| format!("<li>Item {i} R$ {i},90 <button>Comprar</button></li>"))
            .collect();
        let html = format!("<html><body><ul>{items}</ul></body></html>");
        assert_eq!(
            classify_page(&html, "https://x.com/categoria/tenis").0,
            PageKind::Listing
        );
    }

    #[test]
    fn test_plain_page_is_other() {
        let html = "<html><body><h1>Quem somos</h1></body></html>";
        assert_eq!(classify_page(html, "https://x.com/sobre").0, PageKind::Other);
    }
}
