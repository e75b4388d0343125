// src/checker/resolver.rs
// =============================================================================
// Resolves one link: decides how to check it, checks it, records the
// verdict, and reports breakage.
//
// Steps for each link:
// 1. Make the URL absolute (relative links resolve against the page)
// 2. Look up the previous verdict. If it's still fresh, don't probe again.
//    A fresh *broken* verdict still counts as another failure and produces
//    an event, so downstream stays informed about every page that carries
//    the link. Its last_checked is left alone.
// 3. Otherwise check it:
//    - internal links, and absolute links on the site's own host, are
//      looked up in the rendered output on disk (the public origin may not
//      be deployed yet, or may reject HEAD)
//    - everything else goes to the network prober
// 4. Write the new verdict, and on failure publish a BrokenLinkEvent
//
// Cache and publish failures are logged and otherwise ignored; a link's
// verdict never depends on the backend being reachable.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::http::{Probe, ProbeOutcome};
use super::link::Link;
use super::local::{check_local, output_root, site_url_path};
use crate::cache::{CacheBackend, CacheEntry};
use crate::events::{compose_event, record_failure, record_outcome};
use crate::page::Page;

/// What happened to one link, for run accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub url: String,
    pub status: u16,
    pub error: Option<String>,
    /// Verdict came from a fresh cache entry; no probe was made
    pub cached: bool,
}

impl LinkReport {
    pub fn is_broken(&self) -> bool {
        self.error.is_some()
    }
}

pub struct LinkResolver {
    cache: Arc<dyn CacheBackend>,
    prober: Arc<dyn Probe>,
}

impl LinkResolver {
    pub fn new(cache: Arc<dyn CacheBackend>, prober: Arc<dyn Probe>) -> Self {
        Self { cache, prober }
    }

    // Root-relative links ("/tags/") resolve against the site base, other
    // relative links against the page itself. Absolute links pass through.
    pub fn absolute_url(link: &Link, page: &Page) -> String {
        if Url::parse(&link.url).is_ok() {
            return link.url.clone();
        }
        let base = if link.url.starts_with('/') && !link.url.starts_with("//") {
            page.base_url.as_str()
        } else {
            page.document_url()
        };
        match Url::parse(base).and_then(|base| base.join(&link.url)) {
            Ok(url) => url.to_string(),
            Err(_) => link.url.clone(),
        }
    }

    /// Checks a link with the cache in front of it
    pub async fn check(&self, link: &Link, page: &Page, cancel: &CancellationToken) -> LinkReport {
        let url = Self::absolute_url(link, page);
        let previous = self.cache.get_cached_result(&url).await;

        if let Some(prev) = previous.as_ref().filter(|prev| self.cache.is_fresh(prev)) {
            debug!(url = %url, valid = prev.is_valid, "using cached verdict");
            if !prev.is_valid {
                let mut replayed = record_failure(
                    Some(prev),
                    &url,
                    prev.status_code,
                    prev.error.as_deref().unwrap_or_default(),
                    Utc::now(),
                );
                // last_checked stays at the probe time so the failure TTL still runs out
                replayed.last_checked = prev.last_checked;
                if let Err(e) = self.cache.set_cached_result(&replayed).await {
                    warn!(url = %url, error = %e, "failed to cache link result");
                }
                self.publish(link, page, &replayed).await;
            }
            return LinkReport {
                url,
                status: prev.status_code,
                error: prev.error.clone(),
                cached: true,
            };
        }

        let outcome = self.resolve(link, &url, page, cancel).await;
        let entry = record_outcome(previous.as_ref(), &url, &outcome, Utc::now());

        if let Err(e) = self.cache.set_cached_result(&entry).await {
            warn!(url = %url, error = %e, "failed to cache link result");
        }
        if !entry.is_valid {
            warn!(
                url = %url,
                page = %page.site_path,
                status = entry.status_code,
                error = entry.error.as_deref().unwrap_or_default(),
                "broken link"
            );
            self.publish(link, page, &entry).await;
        }

        LinkReport {
            url,
            status: outcome.status,
            error: outcome.error,
            cached: false,
        }
    }

    /// Checks a link without consulting or updating the cache
    pub async fn resolve(
        &self,
        link: &Link,
        url: &str,
        page: &Page,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        if is_local(link, url, page) {
            let path = match Url::parse(url) {
                Ok(parsed) => site_url_path(&parsed, &page.base_url),
                Err(e) => return ProbeOutcome::failed(0, format!("invalid URL: {e}")),
            };
            let root = output_root(&page.rendered_path, &page.site_path);
            return check_local(&root, &path).await;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => ProbeOutcome::failed(0, "probe cancelled"),
            outcome = self.prober.probe(url) => outcome,
        }
    }

    async fn publish(&self, link: &Link, page: &Page, entry: &CacheEntry) {
        let event = compose_event(link, page, entry, Utc::now()).await;
        if let Err(e) = self.cache.publish_broken_link(&event).await {
            warn!(url = %entry.url, page = %page.site_path, error = %e, "failed to publish broken link event");
        }
    }
}

fn is_local(link: &Link, url: &str, page: &Page) -> bool {
    if link.is_internal {
        return true;
    }
    let host = |raw: &str| Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_owned));
    match (host(url), host(&page.base_url)) {
        (Some(link_host), Some(site_host)) => link_host.eq_ignore_ascii_case(&site_host),
        _ => false,
    }
}
