//! JSON-LD (`application/ld+json`) product extraction.

use super::price::{currency_code, parse_price_value};
use super::PartialProduct;
use crate::types::Availability;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});

const PRODUCT_TYPES: &[&str] = &["product", "individualproduct", "productgroup"];

/// Every parseable JSON-LD block in the document, in document order.
pub fn json_ld_blocks(doc: &Html) -> Vec<Value> {
    doc.select(&LD_JSON)
        .filter_map(|script| {
            let raw: String = script.text().collect();
            let raw = raw.trim().trim_end_matches(';');
            match serde_json::from_str::<Value>(raw) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(error = %e, "skipping malformed JSON-LD block");
                    None
                }
            }
        })
        .collect()
}

/// Does `@type` name a product? Accepts a string or a list, with or without
/// a schema.org prefix.
pub fn is_product_type(node: &Value) -> bool {
    let type_matches = |t: &str| {
        let short = t.rsplit(['/', ':']).next().unwrap_or(t);
        PRODUCT_TYPES.contains(&short.to_lowercase().as_str())
    };
    match node.get("@type") {
        Some(Value::String(t)) => type_matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(type_matches),
        _ => false,
    }
}

/// First product node: top level, inside `@graph`, inside a list, or as a
/// page's `mainEntity`.
pub fn find_product(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product),
        Value::Object(map) => {
            if is_product_type(value) {
                return Some(value);
            }
            ["@graph", "mainEntity"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(find_product)
        }
        _ => None,
    }
}

/// Extract product fields from the page's JSON-LD.
pub fn extract(doc: &Html) -> PartialProduct {
    let blocks = json_ld_blocks(doc);
    match blocks.iter().find_map(find_product) {
        Some(product) => map_product(product),
        None => PartialProduct::default(),
    }
}

fn map_product(node: &Value) -> PartialProduct {
    let mut out = PartialProduct {
        name: string_field(node, "name"),
        brand: node.get("brand").and_then(named_value),
        sku: node
            .get("sku")
            .or_else(|| node.get("productID"))
            .or_else(|| node.get("mpn"))
            .and_then(scalar_string),
        gtin: ["gtin13", "gtin", "gtin14", "gtin12", "gtin8", "ean"]
            .iter()
            .find_map(|k| node.get(*k).and_then(scalar_string)),
        images: node.get("image").map(image_list).unwrap_or_default(),
        ..Default::default()
    };

    let offers = node.get("offers").or_else(|| {
        // ProductGroup: offers live on the variants
        node.get("hasVariant")
            .and_then(first_item)
            .and_then(|variant| variant.get("offers"))
    });
    if let Some(offers) = offers {
        apply_offers(&mut out, offers);
    }

    if out.images.is_empty() {
        if let Some(images) = node
            .get("hasVariant")
            .and_then(first_item)
            .and_then(|v| v.get("image"))
        {
            out.images = image_list(images);
        }
    }

    out
}

/// Map `offers` (single object, list, or `AggregateOffer`) onto the record.
fn apply_offers(out: &mut PartialProduct, offers: &Value) {
    let offer = match offers {
        Value::Array(list) => list
            .iter()
            .find(|o| offer_price(o).is_some())
            .or_else(|| list.first()),
        Value::Object(_) => Some(offers),
        _ => None,
    };
    let Some(offer) = offer else {
        return;
    };

    out.price = offer_price(offer);
    out.original_price = list_price(offer).filter(|orig| out.price.is_some_and(|p| *orig > p));
    out.currency = offer
        .get("priceCurrency")
        .or_else(|| {
            offer
                .get("priceSpecification")
                .and_then(first_item)
                .and_then(|s| s.get("priceCurrency"))
        })
        .and_then(Value::as_str)
        .and_then(|c| currency_code(c).map(str::to_string).or_else(|| Some(c.to_string())));
    out.availability = offer
        .get("availability")
        .and_then(Value::as_str)
        .map(availability_from_schema)
        .unwrap_or_default();
}

/// `price`, else `lowPrice` (AggregateOffer), else a `priceSpecification`.
fn offer_price(offer: &Value) -> Option<f64> {
    ["price", "lowPrice", "highPrice"]
        .iter()
        .find_map(|k| offer.get(*k).and_then(parse_price_value))
        .or_else(|| {
            let specs = offer.get("priceSpecification")?;
            let specs: Vec<&Value> = match specs {
                Value::Array(list) => list.iter().collect(),
                other => vec![other],
            };
            specs
                .into_iter()
                .filter(|s| !is_list_price_spec(s))
                .find_map(|s| s.get("price").and_then(parse_price_value))
        })
}

/// Strike-through price from a `ListPrice` price specification.
fn list_price(offer: &Value) -> Option<f64> {
    let specs = offer.get("priceSpecification")?;
    let specs: Vec<&Value> = match specs {
        Value::Array(list) => list.iter().collect(),
        other => vec![other],
    };
    specs
        .into_iter()
        .filter(|s| is_list_price_spec(s))
        .find_map(|s| s.get("price").and_then(parse_price_value))
}

fn is_list_price_spec(spec: &Value) -> bool {
    spec.get("priceType")
        .and_then(Value::as_str)
        .is_some_and(|t| t.contains("ListPrice") || t.contains("StrikethroughPrice"))
}

/// schema.org availability URL or bare token.
pub fn availability_from_schema(value: &str) -> Availability {
    let token = value.rsplit('/').next().unwrap_or(value).to_lowercase();
    match token.as_str() {
        "instock" | "limitedavailability" | "onlineonly" | "instoreonly" | "preorder"
        | "presale" | "backorder" | "in stock" | "in_stock" => Availability::InStock,
        "outofstock" | "soldout" | "discontinued" | "out of stock" | "out_of_stock" => {
            Availability::OutOfStock
        }
        _ => Availability::Unknown,
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).and_then(clean_text)
}

/// Strings and numbers as text (SKUs and GTINs are often numeric).
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `"Acme"`, `{"name": "Acme"}`, or a list of either.
fn named_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Object(_) => value.get("name").and_then(Value::as_str).and_then(clean_text),
        Value::Array(list) => list.iter().find_map(named_value),
        _ => None,
    }
}

/// `"url"`, `["url", ...]`, `{"url": ...}`, or a list of `ImageObject`s.
fn image_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => clean_text(s).into_iter().collect(),
        Value::Object(_) => value
            .get("url")
            .or_else(|| value.get("contentUrl"))
            .map(image_list)
            .unwrap_or_default(),
        Value::Array(list) => list.iter().flat_map(image_list).collect(),
        _ => Vec::new(),
    }
}

fn first_item(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(list) => list.first(),
        Value::Object(_) => Some(value),
        _ => None,
    }
}

/// Trim and collapse internal whitespace; empty strings become `None`.
pub(crate) fn clean_text(s: &str) -> Option<String> {
    let joined = s.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(ld: &str) -> Html {
        Html::parse_document(&format!(
            r#"<html><head><script type="application/ld+json">{ld}</script></head><body></body></html>"#
        ))
    }

    #[test]
    fn test_direct_product() {
        let doc = page(
            r#"{"@context":"https://schema.org","@type":"Product","name":" Tênis  Corrida ",
                "brand":{"@type":"Brand","name":"Passo"},"sku":12345,"gtin13":"7890000000001",
                "image":["https://cdn.x.com/1.jpg","https://cdn.x.com/2.jpg"],
                "offers":{"@type":"Offer","price":"299.90","priceCurrency":"BRL",
                          "availability":"https://schema.org/InStock"}}"#,
        );
        let p = extract(&doc);
        assert_eq!(p.name.as_deref(), Some("Tênis Corrida"));
        assert_eq!(p.brand.as_deref(), Some("Passo"));
        assert_eq!(p.sku.as_deref(), Some("12345"));
        assert_eq!(p.gtin.as_deref(), Some("7890000000001"));
        assert_eq!(p.images.len(), 2);
        assert_eq!(p.price, Some(299.90));
        assert_eq!(p.currency.as_deref(), Some("BRL"));
        assert_eq!(p.availability, Availability::InStock);
    }

    #[test]
    fn test_product_in_graph() {
        let doc = page(
            r#"{"@graph":[{"@type":"WebPage","name":"Página"},
                {"@type":["Product","Thing"],"name":"Camisa","brand":"Marca",
                 "offers":[{"@type":"Offer","price":79.9,"availability":"OutOfStock"}]}]}"#,
        );
        let p = extract(&doc);
        assert_eq!(p.name.as_deref(), Some("Camisa"));
        assert_eq!(p.brand.as_deref(), Some("Marca"));
        assert_eq!(p.price, Some(79.9));
        assert_eq!(p.availability, Availability::OutOfStock);
    }

    #[test]
    fn test_aggregate_offer_uses_low_price() {
        let doc = page(
            r#"[{"@type":"BreadcrumbList"},{"@type":"Product","name":"Kit",
                "offers":{"@type":"AggregateOffer","lowPrice":"49.90","highPrice":"89.90",
                          "priceCurrency":"BRL"}}]"#,
        );
        let p = extract(&doc);
        assert_eq!(p.price, Some(49.90));
        assert_eq!(p.original_price, None);
    }

    #[test]
    fn test_list_price_specification() {
        let doc = page(
            r#"{"@type":"Product","name":"Fone",
                "offers":{"@type":"Offer","price":"199.00",
                  "priceSpecification":[{"@type":"UnitPriceSpecification",
                    "priceType":"https://schema.org/ListPrice","price":"249.00"}]}}"#,
        );
        let p = extract(&doc);
        assert_eq!(p.price, Some(199.0));
        assert_eq!(p.original_price, Some(249.0));
    }

    #[test]
    fn test_product_group_variant_offers() {
        let doc = page(
            r#"{"@type":"ProductGroup","name":"Camiseta",
                "hasVariant":[{"@type":"Product","name":"Camiseta P",
                  "image":{"@type":"ImageObject","url":"https://cdn.x.com/p.jpg"},
                  "offers":{"price":"59,90","priceCurrency":"BRL"}}]}"#,
        );
        let p = extract(&doc);
        assert_eq!(p.name.as_deref(), Some("Camiseta"));
        assert_eq!(p.price, Some(59.90));
        assert_eq!(p.images, vec!["https://cdn.x.com/p.jpg".to_string()]);
    }

    #[test]
    fn test_malformed_and_non_product_blocks() {
        let html = r#"<html><head>
            <script type="application/ld+json">{not json</script>
            <script type="application/ld+json">{"@type":"Organization","name":"Loja"}</script>
            <script type="application/ld+json">{"@type":"http://schema.org/Product","name":"Bolsa"}</script>
            </head></html>"#;
        let p = extract(&Html::parse_document(html));
        assert_eq!(p.name.as_deref(), Some("Bolsa"));
        assert_eq!(p.price, None);
    }

    #[test]
    fn test_no_json_ld() {
        let p = extract(&Html::parse_document("<html><body><h1>x</h1></body></html>"));
        assert_eq!(p, PartialProduct::default());
    }
}
