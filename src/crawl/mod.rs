// src/crawl/mod.rs
// =============================================================================
// This module finds the pages of a rendered site on disk.
//
// The build daemon normally hands pages to the verifier directly. For
// standalone runs we walk the output directory instead and build the same
// Page records from what's there:
// - every *.html file is one page
// - its URL comes from the site base URL plus its path (pretty URLs for
//   index.html files)
// - its content hash is the SHA-256 of the file, so an unchanged page is
//   skipped on the next run
// - its source document is guessed from an optional content directory
// =============================================================================

mod pages;

pub use pages::{discover_pages, page_url_path, SiteLayout};
