//! Last-resort HTML scan: headings, visible price tokens, stock phrases.

use super::price::{currency_code, price_tokens};
use super::structured::clean_text;
use super::PartialProduct;
use crate::cartography::url_classifier::url_path;
use crate::types::Availability;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[-_])(\d+)$").expect("valid regex"));

const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — "];

const OUT_OF_STOCK_PHRASES: &[&str] = &[
    "indisponível",
    "indisponivel",
    "esgotado",
    "fora de estoque",
    "sem estoque",
    "avise-me quando chegar",
    "out of stock",
    "sold out",
    "unavailable",
    "agotado",
];

/// Text nodes outside `<script>`, `<style>`, and `<template>`.
pub fn visible_text(doc: &Html) -> String {
    let mut out = String::new();
    for node in doc.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
            .is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript" | "template"));
        if !hidden {
            out.push_str(&text.text);
            out.push(' ');
        }
    }
    out
}

/// Product title: the second `<h1>` (the first is often a banner), else the
/// `<title>` up to its first separator, else the only `<h1>`.
pub fn heuristic_title(doc: &Html) -> Option<String> {
    let h1s: Vec<String> = doc
        .select(&H1)
        .filter_map(|h| clean_text(&h.text().collect::<String>()))
        .collect();

    if let Some(second) = h1s.get(1) {
        return Some(second.clone());
    }

    let from_title = doc
        .select(&TITLE)
        .next()
        .and_then(|t| clean_text(&t.text().collect::<String>()))
        .and_then(|title| {
            let cut = TITLE_SEPARATORS
                .iter()
                .filter_map(|sep| title.find(sep))
                .min()
                .unwrap_or(title.len());
            clean_text(&title[..cut])
        });

    from_title.or_else(|| h1s.into_iter().next())
}

/// `(original, sale, currency)` from the dominant currency's price tokens.
/// The two largest distinct values are read as original and sale price.
pub fn heuristic_price(text: &str) -> (Option<f64>, Option<f64>, Option<String>) {
    let mut groups: HashMap<String, Vec<f64>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for token in price_tokens(text) {
        if !groups.contains_key(&token.symbol) {
            order.push(token.symbol.clone());
        }
        groups.entry(token.symbol).or_default().push(token.value);
    }

    // Largest group; ties go to the symbol seen first
    let Some(symbol) = order
        .iter()
        .max_by(|a, b| {
            groups[*a]
                .len()
                .cmp(&groups[*b].len())
                .then_with(|| order_index(&order, b).cmp(&order_index(&order, a)))
        })
        .cloned()
    else {
        return (None, None, None);
    };

    let mut values = groups.remove(&symbol).unwrap_or_default();
    values.sort_by(|a, b| b.total_cmp(a));
    values.dedup();

    let currency = currency_code(&symbol).map(str::to_string);
    match values.as_slice() {
        [] => (None, None, currency),
        [only] => (None, Some(*only), currency),
        [original, sale, ..] => (Some(*original), Some(*sale), currency),
    }
}

fn order_index(order: &[String], symbol: &str) -> usize {
    order.iter().position(|s| s == symbol).unwrap_or(usize::MAX)
}

/// Trailing number of the URL slug (`/produto/tenis-12345` → `12345`).
pub fn sku_from_url(url: &str) -> Option<String> {
    let slug = url_path(url)
        .split('/')
        .rev()
        .find(|s| !s.is_empty() && *s != "p")?;
    let slug = slug
        .trim_end_matches(".html")
        .trim_end_matches(".htm");
    TRAILING_DIGITS
        .captures(slug)
        .map(|caps| caps[1].to_string())
}

pub fn heuristic_availability(text: &str) -> Availability {
    let lower = text.to_lowercase();
    if OUT_OF_STOCK_PHRASES.iter().any(|p| lower.contains(p)) {
        Availability::OutOfStock
    } else {
        Availability::InStock
    }
}

/// Extract whatever the page's visible HTML gives away.
pub fn extract(doc: &Html, url: &str) -> PartialProduct {
    let text = visible_text(doc);
    let (original_price, price, currency) = heuristic_price(&text);

    PartialProduct {
        name: heuristic_title(doc),
        price,
        original_price,
        currency,
        sku: sku_from_url(url),
        availability: heuristic_availability(&text),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_prefers_second_h1() {
        let doc = Html::parse_document(
            "<html><head><title>Loja X</title></head><body><h1>Loja X</h1><h1> Bicicleta  Aro 29 </h1></body></html>",
        );
        assert_eq!(heuristic_title(&doc).as_deref(), Some("Bicicleta Aro 29"));
    }

    #[test]
    fn test_title_from_title_tag() {
        let doc = Html::parse_document(
            "<html><head><title>Bicicleta Aro 29 - Esportes | Loja X</title></head><body><h1>Loja X</h1></body></html>",
        );
        assert_eq!(heuristic_title(&doc).as_deref(), Some("Bicicleta Aro 29"));

        let doc = Html::parse_document("<html><body><h1>Só um título</h1></body></html>");
        assert_eq!(heuristic_title(&doc).as_deref(), Some("Só um título"));
    }

    #[test]
    fn test_price_pair_from_dominant_currency() {
        let (orig, sale, cur) =
            heuristic_price("De R$ 1.499,00 por R$ 1.199,00 à vista ou R$ 1.199,00 em 10x. Frete US$ 5");
        assert_eq!(orig, Some(1499.0));
        assert_eq!(sale, Some(1199.0));
        assert_eq!(cur.as_deref(), Some("BRL"));

        let (orig, sale, _) = heuristic_price("Por apenas R$ 59,90");
        assert_eq!(orig, None);
        assert_eq!(sale, Some(59.90));

        assert_eq!(heuristic_price("sem preço"), (None, None, None));
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let doc = Html::parse_document(
            "<html><body><p>R$ 10,00</p><script>var p = 'R$ 999,00';</script></body></html>",
        );
        let text = visible_text(&doc);
        assert!(text.contains("R$ 10,00"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn test_sku_from_url() {
        assert_eq!(sku_from_url("https://x.com/produto/tenis-12345").as_deref(), Some("12345"));
        assert_eq!(sku_from_url("https://x.com/geladeira-frost-321/p").as_deref(), Some("321"));
        assert_eq!(sku_from_url("https://x.com/item-778.html").as_deref(), Some("778"));
        assert_eq!(sku_from_url("https://x.com/produto/tenis-azul"), None);
    }

    #[test]
    fn test_availability_phrases() {
        assert_eq!(heuristic_availability("Produto ESGOTADO"), Availability::OutOfStock);
        assert_eq!(heuristic_availability("Comprar agora"), Availability::InStock);
    }
}
