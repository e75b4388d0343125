// src/cache/memory.rs
// =============================================================================
// In-process cache backend.
//
// Holds link verdicts and page hashes in maps and keeps every published
// event in a list so callers (tests, the CLI) can read them back after a
// run. It also counts calls per operation, which is how tests tell a
// skipped page from a checked one. Nothing survives the process, so a
// fresh MemoryCache always starts with every page unverified.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{CacheBackend, CacheEntry, CacheTtls};
use crate::events::BrokenLinkEvent;

/// Calls made to each backend operation, closed or not
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub result_reads: usize,
    pub result_writes: usize,
    pub hash_reads: usize,
    pub hash_writes: usize,
    pub publishes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    result_reads: AtomicUsize,
    result_writes: AtomicUsize,
    hash_reads: AtomicUsize,
    hash_writes: AtomicUsize,
    publishes: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    ttls: CacheTtls,
    results: RwLock<HashMap<String, CacheEntry>>,
    pages: RwLock<HashMap<String, String>>,
    events: RwLock<Vec<BrokenLinkEvent>>,
    counters: Counters,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            ttls,
            ..Self::default()
        }
    }

    /// Everything published so far, in publish order
    pub async fn events(&self) -> Vec<BrokenLinkEvent> {
        self.events.read().await.clone()
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            result_reads: c.result_reads.load(Ordering::Relaxed),
            result_writes: c.result_writes.load(Ordering::Relaxed),
            hash_reads: c.hash_reads.load(Ordering::Relaxed),
            hash_writes: c.hash_writes.load(Ordering::Relaxed),
            publishes: c.publishes.load(Ordering::Relaxed),
        }
    }

    pub async fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.results.read().await.get(url).cloned()
    }

    pub async fn page_hash(&self, path: &str) -> Option<String> {
        self.pages.read().await.get(path).cloned()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!("memory cache is closed");
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_cached_result(&self, url: &str) -> Option<CacheEntry> {
        bump(&self.counters.result_reads);
        self.ensure_open().ok()?;
        self.entry(url).await
    }

    async fn set_cached_result(&self, entry: &CacheEntry) -> Result<()> {
        bump(&self.counters.result_writes);
        self.ensure_open()?;
        self.results
            .write()
            .await
            .insert(entry.url.clone(), entry.clone());
        Ok(())
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.ttls.is_fresh(entry, Utc::now())
    }

    async fn get_page_hash(&self, path: &str) -> Option<String> {
        bump(&self.counters.hash_reads);
        self.ensure_open().ok()?;
        self.page_hash(path).await
    }

    async fn set_page_hash(&self, path: &str, hash: &str) -> Result<()> {
        bump(&self.counters.hash_writes);
        self.ensure_open()?;
        self.pages
            .write()
            .await
            .insert(path.to_string(), hash.to_string());
        Ok(())
    }

    async fn publish_broken_link(&self, event: &BrokenLinkEvent) -> Result<()> {
        bump(&self.counters.publishes);
        self.ensure_open()?;
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
