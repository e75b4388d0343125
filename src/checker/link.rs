// src/checker/link.rs
// =============================================================================
// A single link candidate pulled out of a rendered page, and the trait for
// whatever pulls them out.
//
// Links are created once per page scan and consumed once by the resolver.
// They are never modified after extraction.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// The href/src exactly as written in the markup
    pub url: String,
    /// Anchor text (or alt/title for non-anchor tags), whitespace collapsed
    pub text: String,
    /// Tag the link came from, e.g. "a" or "img"
    pub tag: String,
    /// Attribute the link came from, e.g. "href" or "src"
    pub attribute: String,
    /// True when the link should resolve within the rendered site
    pub is_internal: bool,
    /// 1-based line in the rendered markup where the link first appears
    pub line: Option<usize>,
}

// Turns rendered markup into link candidates.
//
// Extraction failures are soft: the page is skipped and the run carries on,
// so implementations should return an error rather than panic on input they
// can't handle.
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, document: &str, base_url: &str) -> anyhow::Result<Vec<Link>>;
}
