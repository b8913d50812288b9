//! OpenGraph, Twitter card, and microdata `<meta>` tags.

use super::price::{currency_code, detect_currency, parse_price};
use super::structured::{availability_from_schema, clean_text};
use super::PartialProduct;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[content]").expect("valid selector"));

/// Meta tag contents keyed by lowercased `property`, `name`, or `itemprop`.
/// Repeated keys keep every value in document order.
pub fn meta_tags(doc: &Html) -> HashMap<String, Vec<String>> {
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for el in doc.select(&META) {
        let attrs = el.value();
        let Some(content) = attrs.attr("content").and_then(clean_text) else {
            continue;
        };
        for key_attr in ["property", "name", "itemprop"] {
            if let Some(key) = attrs.attr(key_attr) {
                tags.entry(key.trim().to_lowercase())
                    .or_default()
                    .push(content.clone());
            }
        }
    }
    tags
}

/// Extract product fields from page metadata.
pub fn extract(doc: &Html) -> PartialProduct {
    let tags = meta_tags(doc);
    let first = |keys: &[&str]| first_of(&tags, keys);

    let raw_price = first(&[
        "product:price:amount",
        "og:price:amount",
        "product:sale_price:amount",
        "price",
    ]);
    let price = raw_price.and_then(|p| parse_price(p));
    let original_price = first(&["product:original_price:amount"])
        .and_then(|p| parse_price(p))
        .filter(|orig| price.is_some_and(|p| *orig > p));

    let currency = first(&["product:price:currency", "og:price:currency", "pricecurrency"])
        .and_then(|c| currency_code(c))
        .or_else(|| raw_price.and_then(|p| detect_currency(p)))
        .map(str::to_string);

    let mut images: Vec<String> = Vec::new();
    for key in ["og:image", "og:image:secure_url", "twitter:image", "image"] {
        for url in tags.get(key).into_iter().flatten() {
            if !images.contains(url) {
                images.push(url.clone());
            }
        }
    }

    PartialProduct {
        name: first(&["og:title", "twitter:title", "name"]).cloned(),
        price,
        original_price,
        currency,
        brand: first(&["product:brand", "og:brand", "brand"]).cloned(),
        sku: first(&["product:retailer_item_id", "product:sku", "sku"]).cloned(),
        gtin: first(&["product:ean", "product:gtin", "gtin13", "gtin"]).cloned(),
        images,
        availability: first(&["product:availability", "og:availability", "availability"])
            .map(|a| availability_from_schema(a))
            .unwrap_or_default(),
    }
}

fn first_of<'a>(tags: &'a HashMap<String, Vec<String>>, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|k| tags.get(*k).and_then(|v| v.first()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Availability;

    const PAGE: &str = r#"<html><head>
<meta property="og:type" content="product">
<meta property="og:title" content="Panela de Pressão 4,5L">
<meta property="og:image" content="https://cdn.x.com/panela.jpg">
<meta property="og:image" content="https://cdn.x.com/panela-2.jpg">
<meta name="twitter:image" content="https://cdn.x.com/panela.jpg">
<meta property="product:price:amount" content="189.90">
<meta property="product:price:currency" content="BRL">
<meta property="product:brand" content="Tramontina">
<meta property="product:availability" content="in stock">
<meta property="product:retailer_item_id" content="PAN-45">
</head><body></body></html>"#;

    #[test]
    fn test_open_graph_product() {
        let p = extract(&Html::parse_document(PAGE));
        assert_eq!(p.name.as_deref(), Some("Panela de Pressão 4,5L"));
        assert_eq!(p.price, Some(189.90));
        assert_eq!(p.currency.as_deref(), Some("BRL"));
        assert_eq!(p.brand.as_deref(), Some("Tramontina"));
        assert_eq!(p.sku.as_deref(), Some("PAN-45"));
        assert_eq!(
            p.images,
            vec![
                "https://cdn.x.com/panela.jpg".to_string(),
                "https://cdn.x.com/panela-2.jpg".to_string(),
            ]
        );
        assert_eq!(p.availability, Availability::InStock);
    }

    #[test]
    fn test_twitter_and_microdata_fallbacks() {
        let html = r#"<html><head>
<meta name="twitter:title" content="Relógio">
<meta itemprop="price" content="R$ 250,00">
</head></html>"#;
        let p = extract(&Html::parse_document(html));
        assert_eq!(p.name.as_deref(), Some("Relógio"));
        assert_eq!(p.price, Some(250.0));
        assert_eq!(p.currency.as_deref(), Some("BRL"));
    }

    #[test]
    fn test_empty_content_ignored() {
        let html = r#"<meta property="og:title" content="   ">"#;
        assert_eq!(extract(&Html::parse_document(html)).name, None);
    }
}
