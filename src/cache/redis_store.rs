// src/cache/redis_store.rs
// =============================================================================
// Redis-backed cache and broken-link event stream.
//
// Layout:
//   <prefix>:link:<sha256(url)>   JSON CacheEntry
//   <prefix>:page:<site path>     content hash string
//   <event_stream>                XADD stream, one `event` field of JSON
//
// Connection handling is a small state machine:
//
//   Disconnected --(first use / error)--> Connecting --(ok)--> Connected
//        ^                                                        |
//        +------------------- command error ----------------------+
//
// Only one reconnect loop runs at a time. The loop retries forever with
// jittered exponential backoff until it connects or the cache is closed.
// Operations never wait for it: while not Connected, reads are misses and
// writes/publishes fail fast.
// =============================================================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheBackend, CacheEntry, CacheTtls};
use crate::error::VerifyError;
use crate::events::BrokenLinkEvent;

const FIELD_EVENT: &str = "event";
const INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub url: String,
    pub key_prefix: String,
    pub event_stream: String,
    /// Approximate cap on the event stream length; None keeps everything
    pub stream_max_len: Option<usize>,
    pub ttls: CacheTtls,
}

enum ConnState {
    Disconnected,
    Connecting,
    Connected(MultiplexedConnection),
}

struct Inner {
    client: redis::Client,
    state: Mutex<ConnState>,
    // Held by the reconnect loop for its whole lifetime
    reconnect: Arc<tokio::sync::Mutex<()>>,
    closed: CancellationToken,
    options: RedisOptions,
}

#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<Inner>,
}

impl RedisCache {
    /// Opens the client and makes one bounded connection attempt. If Redis
    /// is down the cache still comes up and keeps reconnecting in the
    /// background; only an unparseable URL is an error.
    pub async fn connect(options: RedisOptions) -> Result<Self, VerifyError> {
        let client = redis::Client::open(options.url.as_str())
            .map_err(|e| VerifyError::Config(format!("invalid redis url: {e}")))?;
        let stream_max_len = options.stream_max_len.filter(|len| *len > 0);

        let cache = Self {
            inner: Arc::new(Inner {
                client,
                state: Mutex::new(ConnState::Disconnected),
                reconnect: Arc::new(tokio::sync::Mutex::new(())),
                closed: CancellationToken::new(),
                options: RedisOptions {
                    stream_max_len,
                    ..options
                },
            }),
        };

        let attempt = tokio::time::timeout(
            INITIAL_CONNECT_TIMEOUT,
            cache.inner.client.get_multiplexed_async_connection(),
        )
        .await;
        match attempt {
            Ok(Ok(conn)) => {
                info!("connected to redis cache");
                cache.set_state(ConnState::Connected(conn));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "redis unavailable at startup, continuing without cache");
                cache.spawn_reconnect();
            }
            Err(_) => {
                warn!("redis connect timed out at startup, continuing without cache");
                cache.spawn_reconnect();
            }
        }
        Ok(cache)
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.lock_state(), ConnState::Connected(_))
    }

    fn link_key(&self, url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        format!("{}:link:{:x}", self.inner.options.key_prefix, digest)
    }

    fn page_key(&self, path: &str) -> String {
        format!("{}:page:{}", self.inner.options.key_prefix, path)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ConnState> {
        // A panic while holding this lock can't leave the enum half-written
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnState) {
        *self.lock_state() = state;
    }

    // Hands out the live connection, or kicks off a reconnect and returns
    // None. Never waits on the network.
    fn connection(&self) -> Option<MultiplexedConnection> {
        if self.inner.closed.is_cancelled() {
            return None;
        }
        let needs_reconnect = {
            let state = self.lock_state();
            match &*state {
                ConnState::Connected(conn) => return Some(conn.clone()),
                ConnState::Connecting => false,
                ConnState::Disconnected => true,
            }
        };
        if needs_reconnect {
            self.spawn_reconnect();
        }
        None
    }

    // Drops a connection that just failed a command and starts reconnecting
    fn mark_broken(&self, error: &redis::RedisError) {
        if !(error.is_io_error()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
            || error.is_timeout())
        {
            return;
        }
        warn!(error = %error, "redis connection lost");
        self.set_state(ConnState::Disconnected);
        self.spawn_reconnect();
    }

    fn spawn_reconnect(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        // Single flight: whoever gets the lock owns the loop
        let Ok(guard) = self.inner.reconnect.clone().try_lock_owned() else {
            return;
        };
        {
            let mut state = self.lock_state();
            if matches!(*state, ConnState::Connected(_)) {
                return;
            }
            *state = ConnState::Connecting;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let mut attempt: u32 = 0;
            loop {
                let connect = cache.inner.client.get_multiplexed_async_connection();
                let result = tokio::select! {
                    _ = cache.inner.closed.cancelled() => return,
                    result = connect => result,
                };
                match result {
                    Ok(conn) => {
                        info!(attempt, "reconnected to redis cache");
                        cache.set_state(ConnState::Connected(conn));
                        return;
                    }
                    Err(e) => {
                        let delay = backoff_delay(attempt);
                        debug!(attempt, error = %e, delay = ?delay, "redis reconnect failed");
                        attempt = attempt.saturating_add(1);
                        tokio::select! {
                            _ = cache.inner.closed.cancelled() => return,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        });
    }
}

// Exponential backoff capped at BACKOFF_MAX, scaled by a random 0.5..1.5
// factor so many daemons don't reconnect in lockstep.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt.min(16)));
    let capped = exp.min(BACKOFF_MAX);
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    capped.mul_f64(jitter)
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get_cached_result(&self, url: &str) -> Option<CacheEntry> {
        let mut conn = self.connection()?;
        let raw: Option<String> = match conn.get(self.link_key(url)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url, error = %e, "cache lookup failed, treating as miss");
                self.mark_broken(&e);
                return None;
            }
        };
        match serde_json::from_str(&raw?) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(url, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn set_cached_result(&self, entry: &CacheEntry) -> Result<()> {
        let mut conn = self
            .connection()
            .ok_or_else(|| anyhow!("redis not connected"))?;
        let payload = serde_json::to_string(entry).context("encoding cache entry")?;
        let result: redis::RedisResult<()> = conn.set(self.link_key(&entry.url), payload).await;
        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result.context("redis_set_link")
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.inner.options.ttls.is_fresh(entry, Utc::now())
    }

    async fn get_page_hash(&self, path: &str) -> Option<String> {
        let mut conn = self.connection()?;
        match conn.get(self.page_key(path)).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(page = path, error = %e, "page hash lookup failed, treating as miss");
                self.mark_broken(&e);
                None
            }
        }
    }

    async fn set_page_hash(&self, path: &str, hash: &str) -> Result<()> {
        let mut conn = self
            .connection()
            .ok_or_else(|| anyhow!("redis not connected"))?;
        let result: redis::RedisResult<()> = conn.set(self.page_key(path), hash).await;
        if let Err(e) = &result {
            self.mark_broken(e);
        }
        result.context("redis_set_page_hash")
    }

    async fn publish_broken_link(&self, event: &BrokenLinkEvent) -> Result<()> {
        let mut conn = self
            .connection()
            .ok_or_else(|| anyhow!("redis not connected"))?;
        let payload = serde_json::to_string(event).context("encoding broken link event")?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.inner.options.event_stream);
        if let Some(max_len) = self.inner.options.stream_max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*").arg(FIELD_EVENT).arg(payload);

        let result: redis::RedisResult<String> = cmd.query_async(&mut conn).await;
        match result {
            Ok(id) => {
                debug!(url = %event.url, stream_id = %id, "published broken link event");
                Ok(())
            }
            Err(e) => {
                self.mark_broken(&e);
                Err(e).context("redis_xadd_broken_link")
            }
        }
    }

    async fn close(&self) {
        self.inner.closed.cancel();
        self.set_state(ConnState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(url: &str) -> RedisOptions {
        RedisOptions {
            url: url.to_string(),
            key_prefix: "test".into(),
            event_stream: "test:broken".into(),
            stream_max_len: Some(0),
            ttls: CacheTtls::default(),
        }
    }

    #[test]
    fn test_backoff_is_capped_and_jittered() {
        for attempt in 0..40 {
            let delay = backoff_delay(attempt);
            assert!(delay <= BACKOFF_MAX.mul_f64(1.5));
            assert!(delay >= BACKOFF_BASE.mul_f64(0.5));
        }
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let result = RedisCache::connect(options("not a url")).await;
        assert!(matches!(result, Err(VerifyError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades() {
        // Port 1 on loopback refuses connections immediately
        let cache = RedisCache::connect(options("redis://127.0.0.1:1/"))
            .await
            .unwrap();
        assert!(!cache.is_connected());
        assert_eq!(cache.inner.options.stream_max_len, None);

        assert!(cache.get_cached_result("https://a.test/").await.is_none());
        assert!(cache.get_page_hash("index.html").await.is_none());
        assert!(cache.set_page_hash("index.html", "abc").await.is_err());
        cache.close().await;
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let cache = RedisCache::connect(options("redis://127.0.0.1:1/"))
            .await
            .unwrap();
        assert_eq!(cache.page_key("tags/index.html"), "test:page:tags/index.html");
        let key = cache.link_key("https://example.com/");
        assert!(key.starts_with("test:link:"));
        assert_eq!(key.len(), "test:link:".len() + 64);
        cache.close().await;
    }
}
