// src/verifier.rs
// =============================================================================
// Drives a verification pass over a batch of rendered pages.
//
// How a run works:
// 1. Refuse to start if another run on this verifier is still going
// 2. For each page, in input order:
//    - stop if the run was cancelled
//    - wait the inter-page delay (skipped before the first page)
//    - take a page slot (at most min(max_concurrent, 4) pages in flight)
//    - spawn a worker for the page
// 3. Wait for every spawned worker, then report
//
// Each page worker:
// - skips the page entirely if its content hash matches the cached one
// - extracts links (a failure here skips the page, nothing more)
// - filters them, then checks the rest concurrently, each check holding a
//   link slot from a pool of max_concurrent
// - once every link has finished, records the page's content hash
//
// Pages and links use separate slot pools, so one page with hundreds of
// links can't stop other pages from making progress.
//
// Rust concepts:
// - Arc: shared ownership of run state across spawned tasks
// - Semaphore: bounded slot pools
// - CancellationToken + tokio::select!: every wait can be interrupted
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheBackend;
use crate::checker::{
    HtmlLinkExtractor, HttpProber, Link, LinkExtractor, LinkFilter, LinkReport, LinkResolver,
    Probe, ProbeOptions,
};
use crate::config::VerifierConfig;
use crate::error::{Result, VerifyError};
use crate::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

// Puts the verifier back to Idle however the run ends
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = RunState::Idle;
    }
}

fn lock(state: &Mutex<RunState>) -> std::sync::MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One broken link found during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub url: String,
    pub page: String,
    pub status: u16,
    pub error: String,
    pub cached: bool,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages: usize,
    pub pages_unchanged: usize,
    pub pages_failed: usize,
    pub links_checked: usize,
    pub cache_hits: usize,
    pub broken: Vec<BrokenLink>,
}

#[derive(Default)]
struct RunStats {
    pages: AtomicUsize,
    pages_unchanged: AtomicUsize,
    pages_failed: AtomicUsize,
    links_checked: AtomicUsize,
    cache_hits: AtomicUsize,
    broken: Mutex<Vec<BrokenLink>>,
}

impl RunStats {
    fn record_link(&self, page: &Page, report: LinkReport) {
        self.links_checked.fetch_add(1, Ordering::Relaxed);
        if report.cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(error) = report.error {
            let mut broken = self.broken.lock().unwrap_or_else(|p| p.into_inner());
            broken.push(BrokenLink {
                url: report.url,
                page: page.site_path.clone(),
                status: report.status,
                error,
                cached: report.cached,
            });
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            pages: self.pages.load(Ordering::Relaxed),
            pages_unchanged: self.pages_unchanged.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            links_checked: self.links_checked.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            broken: self.broken.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        }
    }
}

// Everything a page worker needs, shared by all workers of one run
struct RunContext {
    cache: Arc<dyn CacheBackend>,
    extractor: Arc<dyn LinkExtractor>,
    resolver: Arc<LinkResolver>,
    filter: LinkFilter,
    link_slots: Semaphore,
    cancel: CancellationToken,
    stats: RunStats,
}

pub struct LinkVerifier {
    cache: Arc<dyn CacheBackend>,
    extractor: Arc<dyn LinkExtractor>,
    resolver: Arc<LinkResolver>,
    filter: LinkFilter,
    page_concurrency: usize,
    link_concurrency: usize,
    rate_limit: Duration,
    state: Mutex<RunState>,
}

impl LinkVerifier {
    /// Verifier with the HTML extractor and the HTTP prober
    pub fn new(config: &VerifierConfig, cache: Arc<dyn CacheBackend>) -> Result<Self> {
        config.validate()?;
        let extractor = HtmlLinkExtractor::new()
            .map_err(|e| VerifyError::Config(format!("building link extractor: {e:#}")))?;
        let prober = HttpProber::new(&ProbeOptions {
            timeout: config.request_timeout(),
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
        })?;
        Self::with_parts(config, cache, Arc::new(extractor), Arc::new(prober))
    }

    pub fn with_parts(
        config: &VerifierConfig,
        cache: Arc<dyn CacheBackend>,
        extractor: Arc<dyn LinkExtractor>,
        prober: Arc<dyn Probe>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            resolver: Arc::new(LinkResolver::new(cache.clone(), prober)),
            cache,
            extractor,
            filter: LinkFilter::from_config(config),
            page_concurrency: config.page_concurrency(),
            link_concurrency: config.link_concurrency(),
            rate_limit: config.rate_limit_delay(),
            state: Mutex::new(RunState::Idle),
        })
    }

    fn begin_run(&self) -> Result<RunGuard<'_>> {
        let mut state = lock(&self.state);
        if *state == RunState::Running {
            return Err(VerifyError::AlreadyRunning);
        }
        *state = RunState::Running;
        Ok(RunGuard { state: &self.state })
    }

    // Runs one pass over `pages`. Returns Cancelled if `cancel` fired at
    // any point, after every already-dispatched page has finished.
    pub async fn verify_pages(&self, cancel: &CancellationToken, pages: Vec<Page>) -> Result<RunSummary> {
        let _guard = self.begin_run()?;
        info!(pages = pages.len(), "starting link verification");

        let run = Arc::new(RunContext {
            cache: self.cache.clone(),
            extractor: self.extractor.clone(),
            resolver: self.resolver.clone(),
            filter: self.filter,
            link_slots: Semaphore::new(self.link_concurrency),
            cancel: cancel.clone(),
            stats: RunStats::default(),
        });
        let page_slots = Arc::new(Semaphore::new(self.page_concurrency));
        let mut workers = JoinSet::new();
        let mut interrupted = false;

        for (index, page) in pages.into_iter().enumerate() {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if index > 0 && !self.rate_limit.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.rate_limit) => {}
                }
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                permit = page_slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // the semaphore is never closed
                    Err(_) => break,
                },
            };

            run.stats.pages.fetch_add(1, Ordering::Relaxed);
            let run = run.clone();
            workers.spawn(async move {
                let _permit = permit;
                run.verify_page(page).await;
            });
        }

        if interrupted {
            debug!(in_flight = workers.len(), "cancelled, draining page workers");
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "page worker panicked");
            }
        }

        let summary = run.stats.summary();
        if interrupted || cancel.is_cancelled() {
            warn!(pages = summary.pages, "link verification cancelled");
            return Err(VerifyError::Cancelled);
        }
        info!(
            pages = summary.pages,
            unchanged = summary.pages_unchanged,
            links = summary.links_checked,
            cache_hits = summary.cache_hits,
            broken = summary.broken.len(),
            "link verification finished"
        );
        Ok(summary)
    }
}

impl RunContext {
    async fn verify_page(&self, page: Page) {
        if let Some(hash) = &page.content_hash {
            if self.cache.get_page_hash(&page.site_path).await.as_deref() == Some(hash.as_str()) {
                debug!(page = %page.site_path, "content unchanged, skipping");
                self.stats.pages_unchanged.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let document = match page.read_rendered().await {
            Ok(document) => document,
            Err(e) => {
                warn!(page = %page.site_path, path = %page.rendered_path.display(), error = %e, "failed to read rendered page, skipping");
                self.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let links = match self.extractor.extract(&document, page.document_url()) {
            Ok(links) => links,
            Err(e) => {
                warn!(page = %page.site_path, error = %e, "link extraction failed, skipping page");
                self.stats.pages_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let links = self.filter.apply(links);
        debug!(page = %page.site_path, links = links.len(), "checking links");

        let finished = join_all(links.iter().map(|link| self.check_link(link, &page))).await;
        if finished.contains(&false) || self.cancel.is_cancelled() {
            debug!(page = %page.site_path, "page interrupted, not recording content hash");
            return;
        }

        if let Some(hash) = &page.content_hash {
            if let Err(e) = self.cache.set_page_hash(&page.site_path, hash).await {
                warn!(page = %page.site_path, error = %e, "failed to record page hash");
            }
        }
    }

    // Returns false if the link was never checked because the run was
    // cancelled while it waited for a slot.
    async fn check_link(&self, link: &Link, page: &Page) -> bool {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            permit = self.link_slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };
        let report = self.resolver.check(link, page, &self.cancel).await;
        self.stats.record_link(page, report);
        true
    }
}

/// Child of `parent` that also cancels itself once `deadline` elapses
pub fn deadline_token(parent: &CancellationToken, deadline: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(deadline) => timer.cancel(),
        }
    });
    token
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why a JoinSet for pages but join_all for links?
//    - Page workers are spawned so they run on any runtime thread and we
//      can drain whatever is in flight when a run is cancelled
//    - Link checks borrow the page and the run context, so they stay as
//      plain futures polled together by join_all; the link semaphore is
//      what bounds them
//
// 2. Why is the page hash written last?
//    - A page only counts as verified once every link on it has a verdict.
//      Writing the hash earlier would make an interrupted page look done
//      and the next run would skip it
// -----------------------------------------------------------------------------
