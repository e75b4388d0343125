// src/checker/http.rs
// =============================================================================
// This module checks if external URLs are alive by making HTTP requests.
//
// Key functionality:
// - Makes HTTP HEAD requests first (lightweight, no body download)
// - Falls back to a ranged GET (first 1KB) when HEAD errors or answers
//   404/400, since plenty of servers mishandle HEAD
// - Treats 401/403/405 as "exists" (we just lack credentials) and 429 as
//   "alive, throttling us"; neither is reported as broken
// - Sends a fixed User-Agent and a permissive Accept header on every probe
//
// The status-code policy lives in `classify_status`, a plain function with
// no I/O, so it can be tested without a server.
//
// Rust concepts:
// - async/await: For concurrent network I/O
// - Traits: `Probe` lets the resolver take any prober (tests use fakes)
// - Enums: To represent how a status code should be treated
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RANGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::VerifyError;

/// Bytes requested by the fallback GET
const RANGE_FIRST_KB: &str = "bytes=0-1023";

// What a status code means for the probe that received it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The resource exists (or the server is alive and rate limiting)
    Success,
    /// Worth one more try with GET before calling it broken
    Retryable,
    /// Broken
    Failure,
}

pub fn classify_status(code: u16) -> StatusClass {
    match code {
        // Exists, but needs credentials we don't have / dislikes our method
        401 | 403 | 405 => StatusClass::Success,
        // Alive, just throttling. Never retried.
        429 => StatusClass::Success,
        // Common answers from servers that don't implement HEAD properly
        400 | 404 => StatusClass::Retryable,
        400..=599 => StatusClass::Failure,
        // 1xx/2xx, and 3xx when redirects aren't being followed
        _ => StatusClass::Success,
    }
}

/// Result of checking one link, on disk or over the network.
/// `status` is 0 when no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: u16,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn ok(status: u16) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub user_agent: String,
}

pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(options: &ProbeOptions) -> Result<Self, VerifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&options.user_agent)
                .map_err(|e| VerifyError::Config(format!("invalid user agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        // Either the first response is authoritative, or we follow up to N
        // hops and error past that. reqwest counts the original request as
        // part of the chain, hence the +1.
        let redirect = if options.follow_redirects {
            reqwest::redirect::Policy::limited(options.max_redirects.saturating_add(1))
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(options.timeout)
            .redirect(redirect)
            .default_headers(headers)
            .build()
            .map_err(|e| VerifyError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn ranged_get(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).header(RANGE, RANGE_FIRST_KB).send().await {
            Ok(response) => {
                let status = response.status();
                match classify_status(status.as_u16()) {
                    StatusClass::Success => ProbeOutcome::ok(status.as_u16()),
                    StatusClass::Retryable | StatusClass::Failure => {
                        ProbeOutcome::failed(status.as_u16(), status_text(status))
                    }
                }
            }
            Err(e) => ProbeOutcome::failed(0, describe_error(&e)),
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    // HEAD first; one ranged GET if HEAD blew up or said 404/400
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let target = strip_fragment(url);

        match self.client.head(target).send().await {
            Ok(response) => {
                let status = response.status();
                match classify_status(status.as_u16()) {
                    StatusClass::Success => ProbeOutcome::ok(status.as_u16()),
                    StatusClass::Failure => {
                        ProbeOutcome::failed(status.as_u16(), status_text(status))
                    }
                    StatusClass::Retryable => {
                        debug!(url = target, status = status.as_u16(), "HEAD rejected, retrying with GET");
                        self.ranged_get(target).await
                    }
                }
            }
            Err(e) => {
                debug!(url = target, error = %e, "HEAD failed, retrying with GET");
                self.ranged_get(target).await
            }
        }
    }
}

// Fragments never reach the server, and some servers choke on them
pub fn strip_fragment(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

// Categorizes transport errors from reqwest into something readable
//
// reqwest errors can happen for many reasons:
// - Network timeout
// - DNS resolution failure
// - SSL certificate issues
// - Too many redirects
fn describe_error(error: &reqwest::Error) -> String {
    let text = error.to_string();
    let lower = text.to_lowercase();

    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_redirect() {
        "too many redirects".to_string()
    } else if error.is_connect() {
        if lower.contains("dns") {
            "could not resolve hostname".to_string()
        } else {
            format!("connection failed: {text}")
        }
    } else if lower.contains("certificate") || lower.contains("ssl") || lower.contains("tls") {
        format!("ssl error: {text}")
    } else {
        text
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why HEAD then GET?
//    - HEAD is cheap: no body comes back
//    - But some servers answer HEAD with 404/400/405 even for pages that
//      exist, so a 404/400 (or a transport error) earns one ranged GET
//    - The Range header keeps the GET cheap too; 206 is a success
//
// 2. Why is 429 a success?
//    - The server answered, so the link isn't dead; it's asking us to slow
//      down. Retrying would only make that worse
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn prober() -> HttpProber {
        prober_with_redirects(3)
    }

    fn prober_with_redirects(max_redirects: usize) -> HttpProber {
        HttpProber::new(&ProbeOptions {
            timeout: Duration::from_secs(5),
            follow_redirects: true,
            max_redirects,
            user_agent: "link-verifier-test".into(),
        })
        .unwrap()
    }

    #[test]
    fn test_classify_status() {
        for code in [200, 204, 206, 301, 304] {
            assert_eq!(classify_status(code), StatusClass::Success, "{code}");
        }
        for code in [401, 403, 405, 429] {
            assert_eq!(classify_status(code), StatusClass::Success, "{code}");
        }
        assert_eq!(classify_status(404), StatusClass::Retryable);
        assert_eq!(classify_status(400), StatusClass::Retryable);
        for code in [410, 451, 500, 502, 503] {
            assert_eq!(classify_status(code), StatusClass::Failure, "{code}");
        }
    }

    #[test]
    fn test_strip_fragment() {
        assert_eq!(strip_fragment("https://a.test/x#y"), "https://a.test/x");
        assert_eq!(strip_fragment("https://a.test/x"), "https://a.test/x");
    }

    #[tokio::test]
    async fn test_head_404_falls_back_to_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("range", RANGE_FIRST_KB))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = prober().probe(&format!("{}/page#intro", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::ok(200));

        let requests = server.received_requests().await.unwrap();
        let methods: Vec<_> = requests.iter().map(|r| r.method.to_string()).collect();
        assert_eq!(methods, vec!["HEAD", "GET"]);
    }

    #[tokio::test]
    async fn test_lenient_statuses_do_not_fail() {
        let server = MockServer::start().await;
        for (route, code) in [("/auth", 401), ("/forbidden", 403), ("/method", 405), ("/slow-down", 429)] {
            Mock::given(method("HEAD"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;
        }
        // No GET mocks: a fallback request would get wiremock's 404

        let prober = prober();
        for route in ["/auth", "/forbidden", "/method", "/slow-down"] {
            let outcome = prober.probe(&format!("{}{}", server.uri(), route)).await;
            assert!(outcome.is_ok(), "{route}: {outcome:?}");
        }
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.method.to_string() == "HEAD"));
    }

    #[tokio::test]
    async fn test_get_fallback_applies_leniency() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        let routes = [("/auth", 401), ("/private", 403), ("/method", 405), ("/slow-down", 429)];
        for (route, code) in routes {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(code))
                .mount(&server)
                .await;
        }

        let prober = prober();
        for (route, code) in routes {
            let outcome = prober.probe(&format!("{}{}", server.uri(), route)).await;
            assert_eq!(outcome, ProbeOutcome::ok(code), "{route}");
        }
    }

    fn redirect_chain() -> Vec<Mock> {
        vec![
            Mock::given(path("/a")).respond_with(ResponseTemplate::new(301).insert_header("location", "/b")),
            Mock::given(path("/b")).respond_with(ResponseTemplate::new(302).insert_header("location", "/c")),
            Mock::given(path("/c")).respond_with(ResponseTemplate::new(200)),
        ]
    }

    #[tokio::test]
    async fn test_redirects_followed_up_to_limit() {
        let server = MockServer::start().await;
        for mock in redirect_chain() {
            mock.mount(&server).await;
        }

        // two hops with a limit of three, and exactly at a limit of two
        let outcome = prober().probe(&format!("{}/a", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::ok(200));
        let outcome = prober_with_redirects(2).probe(&format!("{}/a", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::ok(200));
    }

    #[tokio::test]
    async fn test_redirects_past_limit_fail() {
        let server = MockServer::start().await;
        for mock in redirect_chain() {
            mock.mount(&server).await;
        }

        let outcome = prober_with_redirects(1).probe(&format!("{}/a", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::failed(0, "too many redirects"));
        let outcome = prober_with_redirects(0).probe(&format!("{}/c", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::ok(200));
    }

    #[tokio::test]
    async fn test_server_error_is_a_failure_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let outcome = prober().probe(&format!("{}/down", server.uri())).await;
        assert_eq!(outcome.status, 503);
        assert_eq!(outcome.error.as_deref(), Some("HTTP 503 Service Unavailable"));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_both_attempts_404_reports_get_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let outcome = prober().probe(&format!("{}/gone", server.uri())).await;
        assert_eq!(outcome.status, 404);
        assert!(!outcome.is_ok());
    }

    #[tokio::test]
    async fn test_probe_sends_identification_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(header("user-agent", "link-verifier-test"))
            .and(header("accept", "*/*"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let outcome = prober().probe(&server.uri()).await;
        assert_eq!(outcome, ProbeOutcome::ok(200));
    }

    #[tokio::test]
    async fn test_redirects_not_followed_when_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/missing"))
            .mount(&server)
            .await;

        let prober = HttpProber::new(&ProbeOptions {
            timeout: Duration::from_secs(5),
            follow_redirects: false,
            max_redirects: 0,
            user_agent: "link-verifier-test".into(),
        })
        .unwrap();
        let outcome = prober.probe(&format!("{}/old", server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::ok(301));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_failure() {
        let outcome = prober().probe("http://127.0.0.1:1/").await;
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.is_some());
    }
}
