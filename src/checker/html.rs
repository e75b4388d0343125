// src/checker/html.rs
// =============================================================================
// This module extracts links from rendered HTML pages.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Is built on html5ever (Mozilla's HTML parser)
//
// Every href/src we find becomes a Link, tagged internal or external:
// - relative URLs ("/docs/", "../api.html") are internal
// - absolute URLs on the same host as the page are internal
// - everything else is external
//
// Nothing is dropped here. Deciding which links are worth checking
// (anchors, mailto:, feeds...) is the job of `filter.rs`.
// =============================================================================

use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::link::{Link, LinkExtractor};

// (tag, attribute) pairs that can point somewhere worth checking
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("img", "src"),
    ("script", "src"),
    ("iframe", "src"),
    ("source", "src"),
];

pub struct HtmlLinkExtractor {
    // One selector list, so matches come back in document order
    selector: Selector,
}

impl HtmlLinkExtractor {
    pub fn new() -> Result<Self> {
        let list = LINK_SOURCES
            .iter()
            .map(|(tag, attr)| format!("{tag}[{attr}]"))
            .collect::<Vec<_>>()
            .join(", ");
        let selector =
            Selector::parse(&list).map_err(|e| anyhow!("invalid selector {list}: {e:?}"))?;
        Ok(Self { selector })
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    fn extract(&self, document: &str, base_url: &str) -> Result<Vec<Link>> {
        let base = Url::parse(base_url).with_context(|| format!("invalid base URL: {base_url}"))?;
        let html = Html::parse_document(document);

        let mut links = Vec::new();
        let mut cursor = 0;
        for element in html.select(&self.selector) {
            let name = element.value().name();
            let Some(&(tag, attr)) = LINK_SOURCES.iter().find(|(tag, _)| *tag == name) else {
                continue;
            };
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            let url = value.trim().to_string();
            links.push(Link {
                is_internal: is_internal(&base, &url),
                line: line_hint(document, value, &mut cursor),
                text: link_text(&element),
                tag: tag.to_string(),
                attribute: attr.to_string(),
                url,
            });
        }

        Ok(links)
    }
}

// Relative URLs, protocol-relative URLs on our host, and absolute URLs on
// our host all stay inside the site.
fn is_internal(base: &Url, href: &str) -> bool {
    match Url::parse(href) {
        Ok(url) => url.host_str().is_some() && url.host_str() == base.host_str(),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base.join(href) {
            Ok(joined) => joined.host_str() == base.host_str(),
            Err(_) => true,
        },
        Err(_) => false,
    }
}

fn link_text(element: &ElementRef<'_>) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        return text;
    }
    element
        .value()
        .attr("alt")
        .or_else(|| element.value().attr("title"))
        .unwrap_or_default()
        .to_string()
}

// Best effort: the line of the next occurrence of the raw attribute value
// after the previous link. Entity-encoded values won't be found, get no
// hint, and leave the cursor where it was.
fn line_hint(document: &str, value: &str, cursor: &mut usize) -> Option<usize> {
    if value.is_empty() {
        return None;
    }
    let offset = *cursor + document.get(*cursor..)?.find(value)?;
    *cursor = offset + value.len();
    Some(document[..offset].matches('\n').count() + 1)
}
