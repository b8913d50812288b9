//! Parse robots.txt files.
//!
//! Only three things matter here: `Sitemap:` locations, `Crawl-delay` for
//! pacing, and `Allow`/`Disallow` rules for filtering candidate URLs.

use regex::Regex;
use std::sync::LazyLock;

static SITEMAP_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*sitemap:\s*(\S+)").expect("valid regex"));

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    pub allowed: Vec<String>,
    pub disallowed: Vec<String>,
    pub crawl_delay: Option<f32>,
    pub sitemaps: Vec<String>,
}

impl RobotsRules {
    /// Check if a path is allowed by the robots rules.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| path_matches(path, p))
                .map(String::len)
                .max()
        };

        match (longest(&self.allowed), longest(&self.disallowed)) {
            // Longer match wins; ties go to Allow
            (Some(allow), Some(disallow)) => allow >= disallow,
            (None, Some(_)) => false,
            _ => true,
        }
    }

    /// Check a full URL against the rules.
    pub fn is_url_allowed(&self, url: &str) -> bool {
        match url::Url::parse(url) {
            Ok(parsed) => match parsed.query() {
                Some(q) => self.is_allowed(&format!("{}?{q}", parsed.path())),
                None => self.is_allowed(parsed.path()),
            },
            Err(_) => true,
        }
    }
}

/// Parse a robots.txt string for a specific user agent.
pub fn parse_robots(txt: &str, user_agent: &str) -> RobotsRules {
    let mut rules = RobotsRules::default();
    let mut in_matching_group = false;
    let mut seen_user_agent = false;
    // Consecutive User-agent lines share one group
    let mut reading_agents = false;
    let ua_lower = user_agent.to_lowercase();

    for raw_line in txt.lines() {
        // Sitemap directives are global and may contain '#'
        if let Some(caps) = SITEMAP_DIRECTIVE.captures(raw_line) {
            let loc = caps[1].to_string();
            if !rules.sitemaps.contains(&loc) {
                rules.sitemaps.push(loc);
            }
            continue;
        }

        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        // Rules before any User-agent line apply to everyone
        let applies = in_matching_group || !seen_user_agent;

        match key.as_str() {
            "user-agent" => {
                let ua = value.to_lowercase();
                let matches = ua == "*" || ua == ua_lower;
                in_matching_group = matches || (reading_agents && in_matching_group);
                seen_user_agent = true;
                reading_agents = true;
                continue;
            }
            "allow" if applies && !value.is_empty() => {
                rules.allowed.push(value.to_string());
            }
            "disallow" if applies && !value.is_empty() => {
                rules.disallowed.push(value.to_string());
            }
            "crawl-delay" if applies => {
                if let Ok(delay) = value.parse::<f32>() {
                    rules.crawl_delay = Some(delay);
                }
            }
            _ => {}
        }
        reading_agents = false;
    }

    rules
}

/// Check if a path matches a robots.txt pattern (`*` wildcards, `$` anchor).
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let pieces: Vec<&str> = pattern.split('*').collect();
    let mut rest = path;
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(piece) {
                Some(r) => rest = r,
                None => return false,
            }
        } else {
            match rest.find(piece) {
                Some(pos) => rest = &rest[pos + piece.len()..],
                None => return false,
            }
        }
    }

    if anchored {
        let last = pieces.last().copied().unwrap_or("");
        return last.is_empty() || path.ends_with(last);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_robots() {
        let txt = r#"
User-agent: *
Allow: /
Disallow: /checkout
Disallow: /minha-conta/
Crawl-delay: 1.5

Sitemap: https://loja.example.com/sitemap.xml
sitemap:https://loja.example.com/sitemap-produtos.xml.gz
"#;

        let rules = parse_robots(txt, "catalog");
        assert_eq!(rules.allowed.len(), 1);
        assert_eq!(rules.disallowed.len(), 2);
        assert_eq!(rules.crawl_delay, Some(1.5));
        assert_eq!(
            rules.sitemaps,
            vec![
                "https://loja.example.com/sitemap.xml".to_string(),
                "https://loja.example.com/sitemap-produtos.xml.gz".to_string(),
            ]
        );

        assert!(rules.is_allowed("/"));
        assert!(rules.is_allowed("/produto/camisa-10"));
        assert!(!rules.is_allowed("/checkout"));
        assert!(!rules.is_allowed("/minha-conta/pedidos"));
    }

    #[test]
    fn test_allow_overrides_disallow() {
        let txt = r#"
User-agent: *
Disallow: /api/
Allow: /api/public/
"#;
        let rules = parse_robots(txt, "catalog");
        assert!(!rules.is_allowed("/api/secret"));
        assert!(rules.is_allowed("/api/public/docs"));
    }

    #[test]
    fn test_other_agent_groups_ignored() {
        let txt = r#"
User-agent: Googlebot
Disallow: /

User-agent: *
Disallow: /busca
"#;
        let rules = parse_robots(txt, "catalog");
        assert!(rules.is_allowed("/produto/x-1"));
        assert!(!rules.is_allowed("/busca?q=tenis"));
    }

    #[test]
    fn test_shared_group_keeps_earlier_agent() {
        let txt = r#"
User-agent: *
User-agent: Googlebot
Disallow: /carrinho
Crawl-delay: 2

User-agent: Bingbot
Disallow: /
"#;
        let rules = parse_robots(txt, "catalog");
        assert!(!rules.is_allowed("/carrinho"));
        assert!(rules.is_allowed("/produto/x-1"));
        assert_eq!(rules.crawl_delay, Some(2.0));
    }

    #[test]
    fn test_wildcard_patterns() {
        let txt = "User-agent: *\nDisallow: /*?filter=\nDisallow: /*.pdf$\n";
        let rules = parse_robots(txt, "catalog");
        assert!(!rules.is_allowed("/categoria/tenis?filter=azul"));
        assert!(rules.is_allowed("/categoria/tenis"));
        assert!(!rules.is_allowed("/manuais/guia.pdf"));
        assert!(rules.is_allowed("/manuais/guia.pdf.html"));
        assert!(rules.is_url_allowed("https://shop.com/produto/abc-1"));
        assert!(!rules.is_url_allowed("https://shop.com/c/tenis?filter=1"));
    }
}
