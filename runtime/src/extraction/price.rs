//! Price parsing and currency detection.
//!
//! Handles both decimal conventions (`1.299,90` and `1,299.90`) and maps the
//! common currency symbols to ISO codes.

use regex::Regex;
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));

/// A currency-prefixed amount in free text, e.g. `R$ 1.299,90`.
pub static PRICE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(R\$|US\$|€|£|\$)\s?(\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?)")
        .expect("valid regex")
});

/// A price found in page text.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceToken {
    pub symbol: String,
    pub value: f64,
}

/// Parse the first number in `raw` as a positive price.
pub fn parse_price(raw: &str) -> Option<f64> {
    let token = NUMBER.find(raw)?.as_str().trim_end_matches(['.', ',']);

    let normalized = match (token.rfind('.'), token.rfind(',')) {
        // Both present: whichever comes last is the decimal separator
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (None, Some(pos)) => single_separator(token, pos, ','),
        (Some(pos), None) => single_separator(token, pos, '.'),
        (None, None) => token.to_string(),
    };

    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value > 0.0).then_some(value)
}

/// One kind of separator: a lone one followed by exactly three digits is a
/// thousands separator unless the integer part is zero.
fn single_separator(token: &str, pos: usize, sep: char) -> String {
    let decimals = token.len() - pos - 1;
    let lone = token.matches(sep).count() == 1;
    if lone && (decimals != 3 || token.starts_with('0')) {
        token.replace(sep, ".")
    } else {
        token.replace(sep, "")
    }
}

/// Parse a JSON price: a number, or a string holding one.
pub fn parse_price_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v > 0.0),
        serde_json::Value::String(s) => parse_price(s),
        _ => None,
    }
}

/// ISO 4217 code for a currency symbol or code.
pub fn currency_code(symbol: &str) -> Option<&'static str> {
    match symbol.trim().to_uppercase().as_str() {
        "R$" | "BRL" => Some("BRL"),
        "US$" | "$" | "USD" => Some("USD"),
        "€" | "EUR" => Some("EUR"),
        "£" | "GBP" => Some("GBP"),
        _ => None,
    }
}

/// Currency of the first symbol found in `text`.
pub fn detect_currency(text: &str) -> Option<&'static str> {
    for symbol in ["R$", "US$", "€", "£", "$"] {
        if text.contains(symbol) {
            return currency_code(symbol);
        }
    }
    None
}

/// All currency-prefixed amounts in `text`, in order of appearance.
pub fn price_tokens(text: &str) -> Vec<PriceToken> {
    PRICE_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let value = parse_price(&caps[2])?;
            Some(PriceToken {
                symbol: caps[1].to_string(),
                value,
            })
        })
        .collect()
}
