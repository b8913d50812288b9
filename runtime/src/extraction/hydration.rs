//! Framework hydration payloads (`__NEXT_DATA__`, `__INITIAL_STATE__`, ...).
//!
//! Shapes differ per framework and per store, so fields are found by walking
//! the payload and matching keys permissively rather than by fixed paths.

use super::price::{currency_code, parse_price_value};
use super::structured::{availability_from_schema, clean_text};
use super::PartialProduct;
use crate::types::Availability;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::LazyLock;

/// `<script id="__NEXT_DATA__" ...>{...}</script>`
static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script[^>]*id=["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

/// `window.__INITIAL_STATE__ = {...}` and friends.
static STATE_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:window\.)?__(?:INITIAL_STATE|PRELOADED_STATE|APOLLO_STATE|NUXT)__\s*=\s*",
    )
    .expect("valid regex")
});

/// Nodes visited before giving up on a payload.
const MAX_NODES: usize = 20_000;

const NAME_KEYS: &[&str] = &["name", "title", "productname", "producttitle"];
const PRICE_KEYS: &[&str] = &[
    "sellingprice",
    "saleprice",
    "bestprice",
    "finalprice",
    "currentprice",
    "spotprice",
    "price",
];
const LIST_PRICE_KEYS: &[&str] = &[
    "listprice",
    "originalprice",
    "regularprice",
    "oldprice",
    "pricewithoutdiscount",
];
const SKU_KEYS: &[&str] = &["sku", "productid", "skuid", "productreference", "itemid"];
const GTIN_KEYS: &[&str] = &["ean", "gtin", "gtin13", "barcode"];
const BRAND_KEYS: &[&str] = &["brand", "brandname"];
const IMAGE_KEYS: &[&str] = &["images", "image", "imageurl", "imageurls", "thumbnail"];
const CURRENCY_KEYS: &[&str] = &["currency", "currencycode", "pricecurrency"];
const STOCK_KEYS: &[&str] = &["available", "isavailable", "instock", "availability"];

/// Extract product fields from the first hydration payload that has them.
pub fn extract(html: &str) -> PartialProduct {
    payloads(html)
        .iter()
        .find_map(find_product_node)
        .map(map_node)
        .unwrap_or_default()
}

/// Parse every hydration payload in the page.
pub fn payloads(html: &str) -> Vec<Value> {
    let mut out = Vec::new();

    if let Some(caps) = NEXT_DATA.captures(html) {
        if let Ok(v) = serde_json::from_str::<Value>(caps[1].trim()) {
            out.push(v);
        }
    }

    for m in STATE_ASSIGNMENT.find_iter(html) {
        let rest = &html[m.end()..];
        if let Some(json) = balanced_object(rest) {
            if let Ok(v) = serde_json::from_str::<Value>(json) {
                out.push(v);
            }
        }
    }

    out
}

/// The leading `{...}` of `text`, matched by brace depth with string
/// literals skipped.
pub fn balanced_object(text: &str) -> Option<&str> {
    let text = text.trim_start();
    if !text.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Normalised key: lowercase, separators dropped.
fn norm_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    // Key lists are in priority order
    keys.iter().find_map(|wanted| {
        map.iter()
            .find(|(k, v)| norm_key(k) == *wanted && !v.is_null())
            .map(|(_, v)| v)
    })
}

fn has_name(map: &Map<String, Value>) -> bool {
    lookup(map, NAME_KEYS)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

fn has_price(map: &Map<String, Value>) -> bool {
    lookup(map, PRICE_KEYS).and_then(price_of).is_some()
}

/// Breadth-first search for an object carrying both a name and a price.
/// Shallow matches win: the page's main product usually sits above
/// related-product lists.
pub fn find_product_node(root: &Value) -> Option<&Map<String, Value>> {
    let mut queue: VecDeque<&Value> = VecDeque::from([root]);
    let mut visited = 0usize;

    while let Some(node) = queue.pop_front() {
        visited += 1;
        if visited > MAX_NODES {
            break;
        }
        match node {
            Value::Object(map) => {
                if has_name(map) && has_price(map) {
                    return Some(map);
                }
                queue.extend(map.values().filter(|v| v.is_object() || v.is_array()));
            }
            Value::Array(items) => {
                queue.extend(items.iter().filter(|v| v.is_object() || v.is_array()));
            }
            _ => {}
        }
    }
    None
}

/// A price as a number, numeric string, or `{value|amount: ...}` object.
fn price_of(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => lookup(map, &["value", "amount", "price"]).and_then(price_of),
        other => parse_price_value(other),
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => lookup(map, &["name", "title", "value"]).and_then(text_of),
        Value::Array(items) => items.iter().find_map(text_of),
        _ => None,
    }
}

fn images_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => clean_text(s).into_iter().collect(),
        Value::Object(map) => lookup(map, &["url", "src", "imageurl", "href"])
            .map(images_of)
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(images_of).collect(),
        _ => Vec::new(),
    }
}

fn availability_of(value: &Value) -> Availability {
    match value {
        Value::Bool(true) => Availability::InStock,
        Value::Bool(false) => Availability::OutOfStock,
        Value::String(s) => availability_from_schema(s),
        Value::Number(n) => match n.as_f64() {
            Some(q) if q > 0.0 => Availability::InStock,
            Some(_) => Availability::OutOfStock,
            None => Availability::Unknown,
        },
        _ => Availability::Unknown,
    }
}

fn map_node(map: &Map<String, Value>) -> PartialProduct {
    let price = lookup(map, PRICE_KEYS).and_then(price_of);
    let original_price = lookup(map, LIST_PRICE_KEYS)
        .and_then(price_of)
        .filter(|orig| price.is_some_and(|p| *orig > p));

    PartialProduct {
        name: lookup(map, NAME_KEYS).and_then(text_of),
        price,
        original_price,
        currency: lookup(map, CURRENCY_KEYS)
            .and_then(Value::as_str)
            .and_then(|c| currency_code(c).map(str::to_string)),
        brand: lookup(map, BRAND_KEYS).and_then(text_of),
        sku: lookup(map, SKU_KEYS).and_then(text_of),
        gtin: lookup(map, GTIN_KEYS).and_then(text_of),
        images: lookup(map, IMAGE_KEYS).map(images_of).unwrap_or_default(),
        availability: lookup(map, STOCK_KEYS)
            .map(availability_of)
            .unwrap_or_default(),
    }
}
