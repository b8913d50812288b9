//! Headless-render collaborator.
//!
//! Storefronts built as single-page apps ship an empty shell and fill it in
//! with JavaScript, so none of the extraction strategies see a product. The
//! pipeline hands such pages to a [`PageRenderer`] and runs the cascade again
//! over whatever HTML comes back. No browser ships with this crate; callers
//! plug one in.

use crate::extraction::heuristic::visible_text;
use async_trait::async_trait;
use scraper::Html;

/// Bodies shorter than this are treated as shells regardless of markers.
const TINY_BODY_BYTES: usize = 2048;

/// A page with less visible text than this may be a client-rendered shell.
const SPARSE_TEXT_CHARS: usize = 200;

const FRAMEWORK_MARKERS: &[&str] = &[
    r#"<div id="root"></div>"#,
    r#"<div id="app"></div>"#,
    r#"id="__next""#,
    r#"id="__nuxt""#,
    "data-reactroot",
    "ng-version",
    "ng-app",
    "window.__NUXT__",
    "you need to enable javascript",
    "habilite o javascript",
];

/// Renders a URL in a real browser and returns the resulting HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// `None` when rendering failed or timed out.
    async fn render(&self, url: &str) -> Option<String>;
}

/// Whether `body` looks like a client-rendered shell with little content.
pub fn looks_js_rendered(body: &str) -> bool {
    if body.trim().len() < TINY_BODY_BYTES {
        return true;
    }

    let lower = body.to_lowercase();
    if !FRAMEWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }

    let doc = Html::parse_document(body);
    visible_text(&doc).chars().filter(|c| !c.is_whitespace()).count() < SPARSE_TEXT_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(markup: &str) -> String {
        // Inline script bulk pushes the body past the tiny threshold
        format!(
            "<html><head><script>var bundle = \"{}\";</script></head><body>{markup}</body></html>",
            "x".repeat(4000)
        )
    }

    #[test]
    fn test_tiny_body_is_shell() {
        assert!(looks_js_rendered("<html><body></body></html>"));
        assert!(looks_js_rendered(""));
    }

    #[test]
    fn test_react_root_with_no_text() {
        assert!(looks_js_rendered(&padded(r#"<div id="root"></div>"#)));
        assert!(looks_js_rendered(&padded(r#"<div id="__next"><span>Carregando</span></div>"#)));
    }

    #[test]
    fn test_server_rendered_page_is_not_shell() {
        let text = "<p>Descrição completa do produto com bastante texto visível.</p>".repeat(20);
        assert!(!looks_js_rendered(&padded(&format!(r#"<div id="__next">{text}</div>"#))));
    }

    #[test]
    fn test_large_page_without_markers() {
        assert!(!looks_js_rendered(&padded("<main></main>")));
    }
}
