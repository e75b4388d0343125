// src/cache/mod.rs
// =============================================================================
// The cache backend contract.
//
// Verification keeps three kinds of state outside the process:
// - one CacheEntry per absolute link URL (the last verdict plus the failure
//   streak bookkeeping)
// - one content hash per rendered page, so unchanged pages can be skipped
// - a publish channel that receives BrokenLinkEvents for downstream
//   automation (issue creation)
//
// Backends:
// - memory: in-process maps, used by tests and one-shot CLI runs
// - redis_store: durable store plus an event stream, with its own reconnect loop
//
// Callers never see connectivity problems as errors they have to handle:
// lookups degrade to a miss, writes and publishes return an error that is
// logged and ignored.
// =============================================================================

mod memory;
mod redis_store;

pub use memory::{CallCounts, MemoryCache};
pub use redis_store::{RedisCache, RedisOptions};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_FAILURE_TTL, DEFAULT_SUCCESS_TTL};
use crate::events::BrokenLinkEvent;

/// Last known verdict for one absolute URL. Overwritten on every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status_code: u16,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub last_checked: DateTime<Utc>,
    /// Consecutive failed checks since the last success
    pub failure_count: u32,
    /// When the current failure streak began
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failed_at: Option<DateTime<Utc>>,
    pub consecutive_fail: bool,
}

/// Staleness windows, one for good links and a shorter one for bad ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub success: Duration,
    pub failure: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_TTL,
            failure: DEFAULT_FAILURE_TTL,
        }
    }
}

impl CacheTtls {
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let ttl = if entry.is_valid {
            self.success
        } else {
            self.failure
        };
        match now.signed_duration_since(entry.last_checked).to_std() {
            Ok(elapsed) => elapsed < ttl,
            // last_checked in the future: clock skew between writers
            Err(_) => true,
        }
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Previous verdict for `url`, or None on a miss (or an unreachable backend)
    async fn get_cached_result(&self, url: &str) -> Option<CacheEntry>;

    async fn set_cached_result(&self, entry: &CacheEntry) -> anyhow::Result<()>;

    fn is_fresh(&self, entry: &CacheEntry) -> bool;

    async fn get_page_hash(&self, path: &str) -> Option<String>;

    async fn set_page_hash(&self, path: &str, hash: &str) -> anyhow::Result<()>;

    async fn publish_broken_link(&self, event: &BrokenLinkEvent) -> anyhow::Result<()>;

    /// Releases the backend connection. Later calls degrade like a lost connection.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(is_valid: bool, age: ChronoDuration, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            url: "https://example.com/".into(),
            status_code: if is_valid { 200 } else { 404 },
            is_valid,
            error: None,
            last_checked: now - age,
            failure_count: 0,
            first_failed_at: None,
            consecutive_fail: false,
        }
    }

    #[test]
    fn test_valid_entry_uses_success_ttl() {
        let ttls = CacheTtls::default();
        let now = Utc::now();
        assert!(ttls.is_fresh(&entry(true, ChronoDuration::hours(23), now), now));
        assert!(!ttls.is_fresh(&entry(true, ChronoDuration::hours(25), now), now));
    }

    #[test]
    fn test_invalid_entry_uses_failure_ttl() {
        let ttls = CacheTtls::default();
        let now = Utc::now();
        assert!(ttls.is_fresh(&entry(false, ChronoDuration::minutes(59), now), now));
        assert!(!ttls.is_fresh(&entry(false, ChronoDuration::minutes(61), now), now));
    }

    #[test]
    fn test_entry_json_shape() {
        let now = Utc::now();
        let json = serde_json::to_value(entry(true, ChronoDuration::zero(), now)).unwrap();
        assert_eq!(json["status_code"], 200);
        assert_eq!(json["is_valid"], true);
        assert!(json.get("error").is_none());
        assert!(json.get("first_failed_at").is_none());
    }
}
