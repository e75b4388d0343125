// src/events.rs
// =============================================================================
// Failure bookkeeping and broken-link events.
//
// Two jobs:
// 1. Turn a resolution outcome into the CacheEntry that replaces the
//    previous one, carrying the failure streak forward:
//    - failure: failure_count = previous + 1 (1 with no previous entry or
//      after a success), first_failed_at kept from the streak's first
//      failure, consecutive_fail = true
//    - success: failure_count = 0, first_failed_at cleared,
//      consecutive_fail = false; the entry is still written so
//      last_checked moves and the TTL window restarts
// 2. Build the BrokenLinkEvent downstream automation consumes.
//
// The event's JSON field names are a public contract. Don't rename them.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::checker::{Link, ProbeOutcome};
use crate::page::Page;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLinkEvent {
    /// Resolved absolute URL
    pub url: String,
    pub status_code: u16,
    pub error: String,
    pub is_internal: bool,

    pub link_text: String,
    pub link_tag: String,
    pub link_attribute: String,
    pub link_line: Option<usize>,

    pub page_url: String,
    pub page_path: String,
    pub rendered_path: String,
    pub source_path: String,
    pub content_path: Option<String>,
    pub repository: String,
    pub forge: Option<String>,
    pub section: String,
    pub file_name: String,
    pub docs_base: String,

    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,

    pub build_id: String,
    pub build_time: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,

    pub failure_count: u32,
    pub first_failed_at: Option<DateTime<Utc>>,
    pub consecutive_fail: bool,
    pub last_checked: DateTime<Utc>,
}

pub fn record_outcome(
    previous: Option<&CacheEntry>,
    url: &str,
    outcome: &ProbeOutcome,
    now: DateTime<Utc>,
) -> CacheEntry {
    match &outcome.error {
        None => record_success(url, outcome.status, now),
        Some(error) => record_failure(previous, url, outcome.status, error, now),
    }
}

pub fn record_success(url: &str, status: u16, now: DateTime<Utc>) -> CacheEntry {
    CacheEntry {
        url: url.to_string(),
        status_code: status,
        is_valid: true,
        error: None,
        last_checked: now,
        failure_count: 0,
        first_failed_at: None,
        consecutive_fail: false,
    }
}

pub fn record_failure(
    previous: Option<&CacheEntry>,
    url: &str,
    status: u16,
    error: &str,
    now: DateTime<Utc>,
) -> CacheEntry {
    // Only an entry that is itself mid-streak continues the streak
    let streak = previous.filter(|prev| !prev.is_valid);
    let failure_count = streak.map_or(1, |prev| prev.failure_count.saturating_add(1));
    let first_failed_at = streak.and_then(|prev| prev.first_failed_at).unwrap_or(now);

    CacheEntry {
        url: url.to_string(),
        status_code: status,
        is_valid: false,
        error: Some(error.to_string()),
        last_checked: now,
        failure_count,
        first_failed_at: Some(first_failed_at),
        consecutive_fail: true,
    }
}

// Builds the outbound event for one failing occurrence of `link` on `page`.
// Front matter comes from the page if the build parsed it, otherwise from
// the source document, read now.
pub async fn compose_event(
    link: &Link,
    page: &Page,
    entry: &CacheEntry,
    now: DateTime<Utc>,
) -> BrokenLinkEvent {
    let front_matter = page.front_matter().await.unwrap_or_default();

    BrokenLinkEvent {
        url: entry.url.clone(),
        status_code: entry.status_code,
        error: entry.error.clone().unwrap_or_default(),
        is_internal: link.is_internal,

        link_text: link.text.clone(),
        link_tag: link.tag.clone(),
        link_attribute: link.attribute.clone(),
        link_line: link.line,

        page_url: page.url.clone(),
        page_path: page.site_path.clone(),
        rendered_path: page.rendered_path.display().to_string(),
        source_path: page.doc.path.clone(),
        content_path: page.content_path.as_ref().map(|p| p.display().to_string()),
        repository: page.doc.repository.clone(),
        forge: page.doc.forge.clone(),
        section: page.doc.section.clone(),
        file_name: page.doc.name.clone(),
        docs_base: page.doc.docs_base.clone(),

        title: front_matter.title,
        description: front_matter.description,
        date: front_matter.date,
        doc_type: front_matter.kind,

        build_id: page.build_id.clone(),
        build_time: page.build_time,
        detected_at: now,

        failure_count: entry.failure_count,
        first_failed_at: entry.first_failed_at,
        consecutive_fail: entry.consecutive_fail,
        last_checked: entry.last_checked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{DocRef, FrontMatter};
    use chrono::Duration;
    use std::path::PathBuf;

    fn page() -> Page {
        Page {
            doc: DocRef {
                path: "docs/guide/install.md".into(),
                repository: "handbook".into(),
                forge: Some("github".into()),
                section: "guide".into(),
                name: "install.md".into(),
                docs_base: "docs".into(),
            },
            rendered_path: PathBuf::from("/out/guide/install/index.html"),
            content_path: None,
            site_path: "guide/install/index.html".into(),
            url: "https://docs.example.com/guide/install/".into(),
            front_matter: Some(FrontMatter {
                title: Some("Install".into()),
                ..FrontMatter::default()
            }),
            base_url: "https://docs.example.com/".into(),
            build_id: "build-42".into(),
            build_time: Utc::now(),
            content_hash: None,
        }
    }

    fn link() -> Link {
        Link {
            url: "https://gone.example.org/".into(),
            text: "Gone".into(),
            tag: "a".into(),
            attribute: "href".into(),
            is_internal: false,
            line: Some(12),
        }
    }

    #[test]
    fn test_three_failures_build_a_streak() {
        let url = "https://gone.example.org/";
        let t0 = Utc::now();
        let first = record_failure(None, url, 404, "HTTP 404", t0);
        let second = record_failure(Some(&first), url, 404, "HTTP 404", t0 + Duration::hours(2));
        let third = record_failure(Some(&second), url, 500, "HTTP 500", t0 + Duration::hours(4));

        assert_eq!(first.failure_count, 1);
        assert_eq!(third.failure_count, 3);
        assert_eq!(third.first_failed_at, Some(t0));
        assert!(third.consecutive_fail);
        assert_eq!(third.status_code, 500);
    }

    #[test]
    fn test_success_resets_streak() {
        let url = "https://flaky.example.org/";
        let t0 = Utc::now();
        let failed = record_failure(None, url, 0, "timeout", t0);
        let ok = record_outcome(Some(&failed), url, &ProbeOutcome::ok(200), t0 + Duration::hours(1));
        assert_eq!(ok.failure_count, 0);
        assert_eq!(ok.first_failed_at, None);
        assert!(!ok.consecutive_fail);
        assert_eq!(ok.last_checked, t0 + Duration::hours(1));

        let again = record_failure(Some(&ok), url, 404, "HTTP 404", t0 + Duration::hours(2));
        assert_eq!(again.failure_count, 1);
        assert_eq!(again.first_failed_at, Some(t0 + Duration::hours(2)));
    }

    #[tokio::test]
    async fn test_event_carries_provenance_and_streak() {
        let now = Utc::now();
        let entry = record_failure(None, "https://gone.example.org/", 404, "HTTP 404 Not Found", now);
        let event = compose_event(&link(), &page(), &entry, now).await;

        assert_eq!(event.url, "https://gone.example.org/");
        assert_eq!(event.status_code, 404);
        assert_eq!(event.error, "HTTP 404 Not Found");
        assert_eq!(event.repository, "handbook");
        assert_eq!(event.page_path, "guide/install/index.html");
        assert_eq!(event.title.as_deref(), Some("Install"));
        assert_eq!(event.failure_count, 1);
        assert_eq!(event.first_failed_at, Some(now));
        assert_eq!(event.link_line, Some(12));
    }

    #[tokio::test]
    async fn test_front_matter_read_from_source_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("install.md");
        std::fs::write(&source, "---\ntitle: From Disk\ntype: guide\n---\nbody\n").unwrap();

        let mut page = page();
        page.front_matter = None;
        page.content_path = Some(source);

        let now = Utc::now();
        let entry = record_failure(None, "https://gone.example.org/", 404, "HTTP 404", now);
        let event = compose_event(&link(), &page, &entry, now).await;
        assert_eq!(event.title.as_deref(), Some("From Disk"));
        assert_eq!(event.doc_type.as_deref(), Some("guide"));
    }

    #[tokio::test]
    async fn test_event_field_names_are_stable() {
        let now = Utc::now();
        let entry = record_failure(None, "https://gone.example.org/", 404, "HTTP 404", now);
        let event = compose_event(&link(), &page(), &entry, now).await;
        let json = serde_json::to_value(&event).unwrap();
        for field in [
            "url",
            "status_code",
            "error",
            "is_internal",
            "page_url",
            "source_path",
            "repository",
            "title",
            "type",
            "build_id",
            "failure_count",
            "first_failed_at",
            "consecutive_fail",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }
}
