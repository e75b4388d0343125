// src/page.rs
// =============================================================================
// A rendered page and where it came from.
//
// Pages are produced by the site build; this crate only reads them. Each
// page knows:
// - the source document it was rendered from (repository, section, file)
// - where the rendered HTML sits on disk, and its site-relative path
// - the absolute URL it will be served at, and the site's base URL
// - which build produced it, and a content hash for change detection
//
// Front matter is optional on the page. When a broken link needs the
// title/description of its page and the build didn't hand us parsed front
// matter, `parse_front_matter` is run over the source file on demand.
// =============================================================================

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reference to the source document a page was rendered from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    /// Path of the source document inside its repository
    pub path: String,
    pub repository: String,
    /// Forge hosting the repository (github, gitlab, forgejo...)
    pub forge: Option<String>,
    pub section: String,
    pub name: String,
    /// Docs root inside the repository, e.g. "docs"
    pub docs_base: String,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub doc: DocRef,
    /// Rendered HTML on disk
    pub rendered_path: PathBuf,
    /// Source content file on disk (markdown), if the build kept it around
    pub content_path: Option<PathBuf>,
    /// Rendered path relative to the site root, e.g. "tags/index.html"
    pub site_path: String,
    /// Absolute URL of the rendered page
    pub url: String,
    pub front_matter: Option<FrontMatter>,
    pub base_url: String,
    pub build_id: String,
    pub build_time: DateTime<Utc>,
    pub content_hash: Option<String>,
}

impl Page {
    // The URL relative links on this page resolve against. Falls back to
    // the site base when the build didn't give the page its own URL.
    pub fn document_url(&self) -> &str {
        if self.url.is_empty() {
            &self.base_url
        } else {
            &self.url
        }
    }

    pub async fn read_rendered(&self) -> std::io::Result<String> {
        tokio::fs::read_to_string(&self.rendered_path).await
    }

    /// Front matter for this page: the build's parsed copy if it has one,
    /// otherwise parsed from the source document right now.
    pub async fn front_matter(&self) -> Option<FrontMatter> {
        if let Some(fm) = &self.front_matter {
            return Some(fm.clone());
        }
        let path = self.content_path.as_ref()?;
        match tokio::fs::read(path).await {
            Ok(bytes) => parse_front_matter(&bytes),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "source document unreadable for front matter");
                None
            }
        }
    }
}

/// The front matter fields broken-link events carry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// Extracts front matter from a source document.
//
// Recognises YAML between `---` fences and TOML between `+++` fences at the
// very start of the file. Returns None when there is no block, the block
// doesn't parse, or it has none of the fields we care about.
pub fn parse_front_matter(document: &[u8]) -> Option<FrontMatter> {
    let text = std::str::from_utf8(document).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let fm = if let Some(body) = fenced_block(text, "---") {
        let value: serde_yaml::Value = serde_yaml::from_str(body).ok()?;
        let field = |key: &str| value.get(key).and_then(yaml_scalar);
        FrontMatter {
            title: field("title"),
            description: field("description"),
            date: field("date"),
            kind: field("type"),
        }
    } else if let Some(body) = fenced_block(text, "+++") {
        let value: toml::Table = toml::from_str(body).ok()?;
        let field = |key: &str| value.get(key).and_then(toml_scalar);
        FrontMatter {
            title: field("title"),
            description: field("description"),
            date: field("date"),
            kind: field("type"),
        }
    } else {
        return None;
    };

    if fm == FrontMatter::default() {
        None
    } else {
        Some(fm)
    }
}

// Returns the text between an opening fence on the first line and the next
// line consisting only of the same fence.
fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<&'a str> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != fence {
        return None;
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        if line.trim_end() == fence {
            return Some(&text[start..offset]);
        }
        offset += line.len();
    }
    None
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}
