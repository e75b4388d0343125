// src/checker/filter.rs
// =============================================================================
// Decides which extracted links get checked at all.
//
// Filters run in a fixed order:
// 1. external-only mode drops every internal link
// 2. "skip edit links" drops forge edit URLs (/edit/, /-/edit/, /_edit/),
//    which usually need a login and say nothing about the docs
// 3. global rules drop anchors, empty URLs, non-fetchable schemes
//    (mailto:, tel:, javascript:, data:) and, optionally, generated
//    artifacts like feeds, search indices, sitemaps and robots.txt
// =============================================================================

use url::Url;

use super::link::Link;
use crate::config::VerifierConfig;

const UNCHECKABLE_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

const EDIT_SEGMENTS: &[&str] = &["/edit/", "/-/edit/", "/_edit/"];

// Final path segments of files the site generator writes for machines
const GENERATED_FILES: &[&str] = &[
    "index.xml",
    "feed.xml",
    "rss.xml",
    "atom.xml",
    "sitemap.xml",
    "robots.txt",
    "search-index.json",
    "search_index.json",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkFilter {
    pub external_only: bool,
    pub skip_edit_links: bool,
    pub skip_generated: bool,
}

impl LinkFilter {
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self {
            external_only: config.verify_external_only,
            skip_edit_links: config.skip_edit_links,
            skip_generated: config.skip_generated,
        }
    }

    pub fn should_check(&self, link: &Link) -> bool {
        if self.external_only && link.is_internal {
            return false;
        }
        if self.skip_edit_links && is_edit_link(&link.url) {
            return false;
        }
        !is_skippable(&link.url, self.skip_generated)
    }

    /// Keeps extraction order
    pub fn apply(&self, links: Vec<Link>) -> Vec<Link> {
        links.into_iter().filter(|l| self.should_check(l)).collect()
    }
}

pub fn is_edit_link(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    EDIT_SEGMENTS.iter().any(|segment| path.contains(segment))
}

pub fn is_skippable(url: &str, skip_generated: bool) -> bool {
    let url = url.trim();
    if url.is_empty() || url.starts_with('#') {
        return true;
    }

    let lower = url.to_ascii_lowercase();
    if UNCHECKABLE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return true;
    }

    skip_generated && is_generated_artifact(&lower)
}

fn is_generated_artifact(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    GENERATED_FILES.contains(&last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, is_internal: bool) -> Link {
        Link {
            url: url.to_string(),
            text: String::new(),
            tag: "a".into(),
            attribute: "href".into(),
            is_internal,
            line: None,
        }
    }

    #[test]
    fn test_skip_schemes_and_anchors() {
        assert!(is_skippable("#section", false));
        assert!(is_skippable("  ", false));
        assert!(is_skippable("mailto:test@example.com", false));
        assert!(is_skippable("TEL:+123", false));
        assert!(is_skippable("javascript:void(0)", false));
        assert!(is_skippable("data:image/png;base64,AAAA", false));
        assert!(!is_skippable("https://example.com/", false));
        assert!(!is_skippable("/docs/#install", false));
    }

    #[test]
    fn test_generated_artifacts() {
        assert!(is_skippable("/index.xml", true));
        assert!(is_skippable("https://docs.example.com/sitemap.xml", true));
        assert!(is_skippable("/robots.txt?x=1", true));
        assert!(is_skippable("/search-index.json", true));
        assert!(!is_skippable("/index.xml", false));
        assert!(!is_skippable("/docs/index.html", true));
    }

    #[test]
    fn test_edit_links() {
        assert!(is_edit_link("https://github.com/org/repo/edit/main/docs/a.md"));
        assert!(is_edit_link("https://gitlab.com/org/repo/-/edit/main/a.md"));
        assert!(is_edit_link("https://forge.test/org/repo/_edit/main/a.md"));
        assert!(!is_edit_link("https://github.com/org/repo/blob/main/editing.md"));
    }

    #[test]
    fn test_filter_order_and_modes() {
        let links = vec![
            link("/docs/", true),
            link("https://github.com/o/r/edit/main/x.md", false),
            link("https://example.com/", false),
            link("#top", true),
        ];

        let filter = LinkFilter {
            external_only: false,
            skip_edit_links: true,
            skip_generated: true,
        };
        let kept: Vec<_> = filter.apply(links.clone()).into_iter().map(|l| l.url).collect();
        assert_eq!(kept, vec!["/docs/", "https://example.com/"]);

        let external = LinkFilter {
            external_only: true,
            ..filter
        };
        let kept: Vec<_> = external.apply(links.clone()).into_iter().map(|l| l.url).collect();
        assert_eq!(kept, vec!["https://example.com/"]);

        let keep_edits = LinkFilter::default();
        assert_eq!(keep_edits.apply(links).len(), 3);
    }
}
