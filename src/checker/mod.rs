// src/checker/mod.rs
// =============================================================================
// This module contains all link checking logic.
//
// Submodules:
// - link:     the Link type and the LinkExtractor trait
// - html:     extracts links from rendered HTML
// - filter:   decides which links are worth checking
// - local:    checks internal links against the rendered output on disk
// - http:     probes external links over HTTP
// - resolver: ties it together with the result cache and event publishing
// =============================================================================

mod filter;
mod html;
mod http;
mod link;
mod local;
mod resolver;

pub use filter::{is_edit_link, is_skippable, LinkFilter};
pub use html::HtmlLinkExtractor;
pub use http::{classify_status, HttpProber, Probe, ProbeOptions, ProbeOutcome, StatusClass};
pub use link::{Link, LinkExtractor};
pub use local::{local_target, output_root, pretty_url_path, site_url_path};
pub use resolver::{LinkReport, LinkResolver};
