//! Classify URLs by shape.
//!
//! Holds the ranked list of structural product-URL templates the learner
//! tests against validated samples, plus the URL normalisation used for
//! deduplication.

use regex::Regex;
use std::sync::LazyLock;

/// A structural regex over the URL path, with its own adoption threshold.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    pub name: String,
    pub regex: Regex,
    /// Minimum share of the sample (percent) that must be matching products.
    pub min_match_percent: f64,
    /// Length of the fixed literal text in the template; ties go to the longer.
    pub literal_len: usize,
}

impl UrlTemplate {
    fn new(name: &str, pattern: &str, min_match_percent: f64, literal: &str) -> Self {
        Self {
            name: name.to_string(),
            regex: Regex::new(pattern).expect("template regex is valid"),
            min_match_percent,
            literal_len: literal.len(),
        }
    }

    /// Build a template from a learned leading path segment, e.g. `/tenis/`.
    pub fn from_prefix(segment: &str, min_match_percent: f64) -> Option<Self> {
        if segment.is_empty() {
            return None;
        }
        let literal = format!("/{segment}/");
        let pattern = format!(r"^/{}/[^/]+", regex::escape(segment));
        Some(Self {
            name: format!("prefix:{literal}"),
            regex: Regex::new(&pattern).ok()?,
            min_match_percent,
            literal_len: literal.len(),
        })
    }

    /// Test a full URL (or bare path) against the template.
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(&url_path(url).to_lowercase())
    }
}

/// Built-in templates, most specific first. Stricter templates carry lower
/// thresholds because a match on them is already strong evidence.
pub static BUILTIN_TEMPLATES: LazyLock<Vec<UrlTemplate>> = LazyLock::new(|| {
    vec![
        UrlTemplate::new(
            "produto-slug-id",
            r"^/produtos?/[a-z0-9][a-z0-9-]*-\d+/?$",
            15.0,
            "/produto/-",
        ),
        UrlTemplate::new("p-slug-id", r"^/p/[^/]+/\d+/?$", 15.0, "/p//"),
        UrlTemplate::new("slug-id-p", r"^/[a-z0-9][a-z0-9-]*-\d+/p/?$", 20.0, "-/p"),
        UrlTemplate::new(
            "amazon-dp",
            r"^/(?:[^/]+/)?(?:dp|gp/product)/[a-z0-9]{10}(?:/|$)",
            20.0,
            "/dp/",
        ),
        UrlTemplate::new("products-slug", r"^/products?/[^/]+/?$", 20.0, "/product/"),
        UrlTemplate::new(
            "item-slug",
            r"^/(?:item|itens|produit|producto|artikel)s?/[^/]+/?$",
            25.0,
            "/item/",
        ),
        UrlTemplate::new("slug-id-html", r"^/[^/]+-\d+\.html?$", 30.0, "-.html"),
        UrlTemplate::new("slug-digits", r"^/[a-z0-9][a-z0-9-]*-\d{3,}/?$", 35.0, "-"),
        UrlTemplate::new("third-segment", r"^/[^/]+/[^/]+/[^/]+", 50.0, ""),
    ]
});

/// Path component of a URL; bare paths pass through unchanged.
pub fn url_path(url: &str) -> &str {
    let rest = match url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    {
        Some(rest) => match rest.find('/') {
            Some(slash_pos) => &rest[slash_pos..],
            None => return "/",
        },
        None => url,
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

/// Deduplication key: query and fragment stripped, trailing slash removed.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    let without_query = &trimmed[..end];
    without_query.trim_end_matches('/').to_string()
}

/// First path segment, lowercased (`/tenis/air-max` → `tenis`).
pub fn first_segment(url: &str) -> Option<String> {
    url_path(url)
        .split('/')
        .find(|s| !s.is_empty())
        .map(str::to_lowercase)
}

/// Path segments that conventionally mark a product page.
pub fn has_product_segment(url: &str) -> bool {
    const SEGMENTS: &[&str] = &[
        "produto", "produtos", "product", "products", "p", "dp", "item", "produit", "producto",
    ];
    url_path(url)
        .to_lowercase()
        .split('/')
        .any(|seg| SEGMENTS.contains(&seg))
}

/// Path segments that conventionally mark a category or listing page.
pub fn has_category_segment(url: &str) -> bool {
    const SEGMENTS: &[&str] = &[
        "categoria",
        "categorias",
        "category",
        "categories",
        "c",
        "collections",
        "departamento",
        "departamentos",
        "shop",
        "loja",
        "colecao",
    ];
    url_path(url)
        .to_lowercase()
        .split('/')
        .any(|seg| SEGMENTS.contains(&seg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> &'static UrlTemplate {
        BUILTIN_TEMPLATES.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://shop.com/p/x?a=1"), "/p/x");
        assert_eq!(url_path("https://shop.com"), "/");
        assert_eq!(url_path("http://shop.com/a/b#frag"), "/a/b");
        assert_eq!(url_path("/produto/x-1"), "/produto/x-1");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://shop.com/produto/x-1/?utm=a"),
            "https://shop.com/produto/x-1"
        );
        assert_eq!(normalize_url("https://shop.com/"), "https://shop.com");
        assert_eq!(
            normalize_url("https://shop.com/a#top"),
            normalize_url("https://shop.com/a/")
        );
    }

    #[test]
    fn test_builtin_templates() {
        let t = template("produto-slug-id");
        assert!(t.matches("https://loja.com.br/produto/tenis-corrida-azul-12345"));
        assert!(t.matches("https://loja.com.br/produtos/camisa-9/"));
        assert!(!t.matches("https://loja.com.br/produto/tenis-corrida"));
        assert!(!t.matches("https://loja.com.br/categoria/tenis-10"));

        let t = template("p-slug-id");
        assert!(t.matches("https://shop.com/p/blue-shirt/998877"));
        assert!(!t.matches("https://shop.com/p/blue-shirt"));

        let t = template("slug-id-p");
        assert!(t.matches("https://vtex.com.br/geladeira-frost-free-123/p"));

        let t = template("amazon-dp");
        assert!(t.matches("https://amazon.com/Some-Thing/dp/B0EXAMPLE1"));

        let t = template("third-segment");
        assert!(t.matches("https://shop.com/a/b/c"));
        assert!(!t.matches("https://shop.com/a/b"));
    }

    #[test]
    fn test_templates_ordered_by_specificity_thresholds() {
        let first = &BUILTIN_TEMPLATES[0];
        let last = BUILTIN_TEMPLATES.last().unwrap();
        assert!(first.min_match_percent < last.min_match_percent);
        assert!(first.literal_len > last.literal_len);
    }

    #[test]
    fn test_prefix_template() {
        let t = UrlTemplate::from_prefix("tenis", 40.0).unwrap();
        assert!(t.matches("https://shop.com/tenis/air-max-90"));
        assert!(!t.matches("https://shop.com/tenis"));
        assert!(!t.matches("https://shop.com/camisas/polo"));
        assert_eq!(t.literal_len, "/tenis/".len());
        assert!(UrlTemplate::from_prefix("", 40.0).is_none());
    }

    #[test]
    fn test_segment_markers() {
        assert!(has_product_segment("https://shop.com/produto/x-1"));
        assert!(!has_product_segment("https://shop.com/blog/x"));
        assert!(has_category_segment("https://shop.com/categoria/tenis"));
        assert_eq!(first_segment("https://shop.com/Tenis/x"), Some("tenis".to_string()));
        assert_eq!(first_segment("https://shop.com/"), None);
    }
}
