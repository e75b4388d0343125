// src/config.rs
// =============================================================================
// Configuration for link verification.
//
// The config lives in a TOML file under a `[link_verification]` table, e.g.
//
//   [link_verification]
//   max_concurrent = 10
//   request_timeout = "10s"
//   rate_limit_delay = "100ms"
//   cache_ttl = "24h"
//   cache_ttl_failures = "1h"
//
// Every field has a default, so an empty table (or no file at all) is a
// usable config. Durations are written Go-style ("250ms", "1h30m") and are
// parsed lazily; a malformed value falls back to its default with a warning
// instead of failing the build daemon.
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::cache::CacheTtls;
use crate::error::VerifyError;

pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

/// Pages in flight never exceed this, however high `max_concurrent` goes.
pub const MAX_PAGE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub enabled: bool,
    /// Upper bound on concurrent link checks (and, capped, on pages)
    pub max_concurrent: usize,
    pub request_timeout: String,
    /// Pause between dispatching two pages
    pub rate_limit_delay: String,
    pub verify_external_only: bool,
    pub skip_edit_links: bool,
    /// Skip feeds, search indices, sitemaps and robots.txt
    pub skip_generated: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub cache_ttl: String,
    pub cache_ttl_failures: String,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub event_stream: String,
    pub user_agent: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            request_timeout: "10s".to_string(),
            rate_limit_delay: "100ms".to_string(),
            verify_external_only: false,
            skip_edit_links: true,
            skip_generated: true,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            cache_ttl: "24h".to_string(),
            cache_ttl_failures: "1h".to_string(),
            redis_url: None,
            key_prefix: "linkverify".to_string(),
            event_stream: "linkverify:broken".to_string(),
            user_agent: concat!("link-verifier/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// Wrapper so the config can sit alongside other daemon sections in one file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    link_verification: Option<VerifierConfig>,
}

impl VerifierConfig {
    /// Parses a TOML document. Reads the `[link_verification]` table when
    /// present, otherwise treats the whole document as the table body.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw).context("parsing config TOML")?;
        match file.link_verification {
            Some(config) => Ok(config),
            None => toml::from_str(raw).context("parsing link verification config"),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Rejects configs that can't drive a run. Called once at construction.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if !self.enabled {
            return Err(VerifyError::Config("link verification is disabled".into()));
        }
        if self.max_concurrent == 0 {
            return Err(VerifyError::Config("max_concurrent must be at least 1".into()));
        }
        if self.key_prefix.trim().is_empty() {
            return Err(VerifyError::Config("key_prefix must not be empty".into()));
        }
        if self.redis_url.is_some() && self.event_stream.trim().is_empty() {
            return Err(VerifyError::Config(
                "event_stream is required when redis_url is set".into(),
            ));
        }
        Ok(())
    }

    pub fn page_concurrency(&self) -> usize {
        self.max_concurrent.clamp(1, MAX_PAGE_CONCURRENCY)
    }

    pub fn link_concurrency(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        duration_or_default("request_timeout", &self.request_timeout, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        duration_or_default("rate_limit_delay", &self.rate_limit_delay, DEFAULT_RATE_LIMIT_DELAY)
    }

    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            success: duration_or_default("cache_ttl", &self.cache_ttl, DEFAULT_SUCCESS_TTL),
            failure: duration_or_default(
                "cache_ttl_failures",
                &self.cache_ttl_failures,
                DEFAULT_FAILURE_TTL,
            ),
        }
    }
}

fn duration_or_default(field: &str, raw: &str, default: Duration) -> Duration {
    match parse_duration(raw) {
        Some(d) => d,
        None => {
            warn!(field, value = raw, default = ?default, "malformed duration, using default");
            default
        }
    }
}

// Parses Go-style durations: "100ms", "10s", "1h30m", "1.5h".
//
// Returns None for anything it doesn't understand, including negative
// values and a bare number without a unit (other than "0").
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let value: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        rest = &rest[unit_end..];
        total += value * seconds_per_unit;
    }

    Duration::try_from_secs_f64(total).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("100ms"), Some(Duration::from_millis(100)));
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("10 parsecs"), None);
        assert_eq!(parse_duration("-5s"), None);
    }

    #[test]
    fn test_malformed_rate_limit_falls_back() {
        let config = VerifierConfig {
            rate_limit_delay: "soon".into(),
            ..VerifierConfig::default()
        };
        assert_eq!(config.rate_limit_delay(), DEFAULT_RATE_LIMIT_DELAY);
    }

    #[test]
    fn test_ttls_from_config() {
        let config = VerifierConfig {
            cache_ttl: "2h".into(),
            cache_ttl_failures: "bogus".into(),
            ..VerifierConfig::default()
        };
        let ttls = config.ttls();
        assert_eq!(ttls.success, Duration::from_secs(7_200));
        assert_eq!(ttls.failure, DEFAULT_FAILURE_TTL);
    }

    #[test]
    fn test_page_concurrency_is_capped() {
        let config = VerifierConfig {
            max_concurrent: 32,
            ..VerifierConfig::default()
        };
        assert_eq!(config.page_concurrency(), 4);
        assert_eq!(config.link_concurrency(), 32);

        let config = VerifierConfig {
            max_concurrent: 2,
            ..VerifierConfig::default()
        };
        assert_eq!(config.page_concurrency(), 2);
    }

    #[test]
    fn test_disabled_config_rejected() {
        let config = VerifierConfig {
            enabled: false,
            ..VerifierConfig::default()
        };
        assert!(matches!(config.validate(), Err(VerifyError::Config(_))));
        assert!(VerifierConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml_table() {
        let raw = r#"
[site]
title = "docs"

[link_verification]
max_concurrent = 6
verify_external_only = true
cache_ttl = "12h"
"#;
        let config = VerifierConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.max_concurrent, 6);
        assert!(config.verify_external_only);
        assert_eq!(config.ttls().success, Duration::from_secs(43_200));
        // untouched fields keep their defaults
        assert!(config.skip_edit_links);
    }

    #[test]
    fn test_from_bare_toml() {
        let config = VerifierConfig::from_toml_str("follow_redirects = false\n").unwrap();
        assert!(!config.follow_redirects);
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
    }
}
