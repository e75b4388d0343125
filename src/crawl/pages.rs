// src/crawl/pages.rs
// =============================================================================
// Walks a rendered output directory and builds one Page per HTML file.
//
// Rust concepts:
// - walkdir: recursive directory iteration with sorted, deterministic order
// - Path/PathBuf: platform paths, converted to '/'-separated site paths
// - Iterators + Result: errors on individual files are logged and skipped
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;
use walkdir::WalkDir;

use crate::page::{DocRef, Page};

#[derive(Debug, Clone)]
pub struct SiteLayout {
    /// Root of the rendered site (the directory the web server serves)
    pub output_dir: PathBuf,
    pub base_url: String,
    /// Markdown sources, if available, for front matter and provenance
    pub content_dir: Option<PathBuf>,
    pub repository: String,
    pub build_id: String,
    pub build_time: DateTime<Utc>,
}

pub fn discover_pages(layout: &SiteLayout) -> Result<Vec<Page>> {
    let mut base = Url::parse(&layout.base_url)
        .map_err(|e| anyhow!("invalid base URL '{}': {}", layout.base_url, e))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut pages = Vec::new();
    for entry in WalkDir::new(&layout.output_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry in output directory");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("html") {
            continue;
        }

        match build_page(layout, &base, path) {
            Ok(page) => pages.push(page),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping page"),
        }
    }

    debug!(count = pages.len(), dir = %layout.output_dir.display(), "discovered rendered pages");
    Ok(pages)
}

fn build_page(layout: &SiteLayout, base: &Url, path: &Path) -> Result<Page> {
    let relative = path
        .strip_prefix(&layout.output_dir)
        .context("page outside output directory")?;
    let site_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let content_hash = format!("{:x}", Sha256::digest(&bytes));

    let url = base
        .join(&page_url_path(&site_path))
        .with_context(|| format!("building URL for {site_path}"))?;

    let content_path = layout
        .content_dir
        .as_deref()
        .and_then(|dir| find_source(dir, &site_path));

    Ok(Page {
        doc: doc_ref(layout, &site_path, content_path.as_deref()),
        rendered_path: path.to_path_buf(),
        content_path,
        site_path,
        url: url.to_string(),
        front_matter: None,
        base_url: base.to_string(),
        build_id: layout.build_id.clone(),
        build_time: layout.build_time,
        content_hash: Some(content_hash),
    })
}

// "tags/index.html" -> "tags/", "index.html" -> "", "404.html" -> "404.html"
pub fn page_url_path(site_path: &str) -> String {
    match site_path.strip_suffix("index.html") {
        Some(dir) if dir.is_empty() || dir.ends_with('/') => dir.to_string(),
        _ => site_path.to_string(),
    }
}

// Hugo-style guesses for the markdown a page was rendered from
fn find_source(content_dir: &Path, site_path: &str) -> Option<PathBuf> {
    let stem = page_url_path(site_path);
    let stem = stem.trim_end_matches('/');
    let stem = stem.strip_suffix(".html").unwrap_or(stem);

    let candidates = if stem.is_empty() {
        vec![content_dir.join("_index.md"), content_dir.join("index.md")]
    } else {
        vec![
            content_dir.join(format!("{stem}.md")),
            content_dir.join(stem).join("_index.md"),
            content_dir.join(stem).join("index.md"),
        ]
    };
    candidates.into_iter().find(|candidate| candidate.is_file())
}

fn doc_ref(layout: &SiteLayout, site_path: &str, source: Option<&Path>) -> DocRef {
    let section = match site_path.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => String::new(),
    };
    let docs_base = layout
        .content_dir
        .as_deref()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (path, name) = match (source, layout.content_dir.as_deref()) {
        (Some(source), Some(dir)) => (
            source
                .strip_prefix(dir)
                .unwrap_or(source)
                .to_string_lossy()
                .replace('\\', "/"),
            source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        ),
        _ => (String::new(), String::new()),
    };

    DocRef {
        path,
        repository: layout.repository.clone(),
        forge: None,
        section,
        name,
        docs_base,
    }
}
