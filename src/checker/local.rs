// src/checker/local.rs
// =============================================================================
// Checks internal links against the rendered output on disk.
//
// Static site generators write "pretty URLs": /tags/ is served from
// tags/index.html. So before looking a link up we map its URL path to the
// file the server would actually send:
//
//   /                 -> /index.html
//   /tags/            -> /tags/index.html
//   /tags             -> /tags/index.html   (no extension)
//   /tags/index.html  -> /tags/index.html
//   /img/logo.png     -> /img/logo.png
//
// URL paths are taken relative to the site's base URL and percent-decoded
// first: with a base of https://host/handbook/, the link
// https://host/handbook/caf%C3%A9/ is looked up as /café/.
//
// The output root isn't passed in. We find it by walking up from the page's
// own rendered file by as many levels as its site-relative path has
// components (tags/index.html sits two levels below the root).
// =============================================================================

use std::path::{Component, Path, PathBuf};

use url::Url;

use super::http::ProbeOutcome;

/// Decoded path of `url` below the path of `base_url`. URLs outside the
/// base path keep their full path.
pub fn site_url_path(url: &Url, base_url: &str) -> String {
    let prefix = Url::parse(base_url)
        .map(|base| base.path().trim_end_matches('/').to_string())
        .unwrap_or_default();
    let path = url.path();
    let relative = match path.strip_prefix(prefix.as_str()) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    };
    match urlencoding::decode(relative) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => relative.to_string(),
    }
}

pub fn pretty_url_path(url_path: &str) -> String {
    if url_path.is_empty() || url_path == "/" {
        return "/index.html".to_string();
    }
    if let Some(dir) = url_path.strip_suffix('/') {
        return format!("{dir}/index.html");
    }
    let last = url_path.rsplit('/').next().unwrap_or(url_path);
    if last.contains('.') {
        url_path.to_string()
    } else {
        format!("{url_path}/index.html")
    }
}

pub fn output_root(rendered_path: &Path, site_path: &str) -> PathBuf {
    let depth = site_path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .count();
    let mut root = rendered_path;
    for _ in 0..depth {
        match root.parent() {
            Some(parent) => root = parent,
            None => break,
        }
    }
    root.to_path_buf()
}

/// File an internal URL path maps to under `root`
pub fn local_target(root: &Path, url_path: &str) -> PathBuf {
    let mapped = pretty_url_path(url_path);
    root.join(mapped.trim_start_matches('/'))
}

pub async fn check_local(root: &Path, url_path: &str) -> ProbeOutcome {
    let target = local_target(root, url_path);
    // decoded %2e%2e must not climb out of the output root
    if target.components().any(|c| c == Component::ParentDir) {
        return ProbeOutcome::failed(404, format!("path outside output root: {url_path}"));
    }
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => ProbeOutcome::ok(200),
        Ok(_) => ProbeOutcome::failed(404, format!("path is a directory: {}", target.display())),
        Err(_) => ProbeOutcome::failed(404, format!("file not found: {}", target.display())),
    }
}
