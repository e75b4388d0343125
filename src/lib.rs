// src/lib.rs
// =============================================================================
// Link verification for rendered documentation sites.
//
// After a site build, `LinkVerifier::verify_pages` walks the rendered pages,
// checks every link (internal links on disk, external links over HTTP),
// caches each verdict with separate TTLs for good and bad links, and
// publishes a BrokenLinkEvent for every failing link so downstream
// automation can open issues.
//
// Module map:
// - config:   VerifierConfig, loaded from TOML
// - page:     Page / DocRef / front matter
// - checker:  extraction, filtering, local + HTTP resolution
// - cache:    the CacheBackend contract plus memory and Redis backends
// - events:   failure streak bookkeeping and BrokenLinkEvent
// - verifier: the orchestrator
// - crawl:    builds Pages from a rendered output directory
// =============================================================================

pub mod cache;
pub mod checker;
pub mod config;
pub mod crawl;
pub mod error;
pub mod events;
pub mod page;
pub mod verifier;

pub use cache::{CacheBackend, CacheEntry, CacheTtls, MemoryCache, RedisCache, RedisOptions};
pub use config::VerifierConfig;
pub use error::VerifyError;
pub use events::BrokenLinkEvent;
pub use page::{DocRef, FrontMatter, Page};
pub use verifier::{deadline_token, BrokenLink, LinkVerifier, RunSummary};
