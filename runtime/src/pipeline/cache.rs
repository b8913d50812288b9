//! Run-scoped product cache.
//!
//! Pages extracted while validating learning samples are kept here and
//! handed to the extraction phase instead of being fetched again. One cache
//! lives for one run; nothing is ever evicted.

use crate::cartography::url_classifier::normalize_url;
use crate::types::ExtractedProduct;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ProductCache {
    entries: DashMap<String, ExtractedProduct>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: ExtractedProduct) {
        self.entries.insert(normalize_url(&product.url), product);
    }

    pub fn get(&self, url: &str) -> Option<ExtractedProduct> {
        self.entries
            .get(&normalize_url(url))
            .map(|entry| entry.value().clone())
    }

    /// Remove and return the record for `url`.
    pub fn take(&self, url: &str) -> Option<ExtractedProduct> {
        self.entries.remove(&normalize_url(url)).map(|(_, p)| p)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(&normalize_url(url))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(url: &str) -> ExtractedProduct {
        ExtractedProduct {
            url: url.to_string(),
            name: Some("Caneca".into()),
            price: Some(29.9),
            ..Default::default()
        }
    }

    #[test]
    fn test_lookup_by_normalized_url() {
        let cache = ProductCache::new();
        cache.insert(product("https://x.com/produto/caneca-1/"));
        assert!(cache.contains("https://x.com/produto/caneca-1?utm_source=mail"));
        assert_eq!(cache.get("https://x.com/produto/caneca-1").unwrap().price, Some(29.9));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_take_removes() {
        let cache = ProductCache::new();
        cache.insert(product("https://x.com/p/1"));
        assert!(cache.take("https://x.com/p/1").is_some());
        assert!(cache.take("https://x.com/p/1").is_none());
        assert!(cache.is_empty());
    }
}
