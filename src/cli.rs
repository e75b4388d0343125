// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes. Flags that are also daemon settings can come
// from the environment (REDIS_URL, BASE_URL...) so the same binary works in
// CI and under a process supervisor.
// =============================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "link-verifier",
    version,
    about = "Verify links in a rendered documentation site",
    long_about = "link-verifier checks every internal and external link in a rendered site, \
                  caches the results, and reports broken links. Internal links are checked \
                  against the files on disk; external links with HEAD/GET probes."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify every page of a rendered site directory
    ///
    /// Example: link-verifier verify public/ --base-url https://docs.example.com/
    Verify {
        /// Rendered site output directory (e.g. public/)
        output_dir: PathBuf,

        /// Absolute URL the site is served at
        #[arg(long, env = "BASE_URL")]
        base_url: String,

        /// Markdown source directory, used for front matter in reports
        #[arg(long)]
        content_dir: Option<PathBuf>,

        /// TOML config file with a [link_verification] table
        #[arg(long, env = "LINK_VERIFIER_CONFIG")]
        config: Option<PathBuf>,

        /// Redis URL for the result cache and event stream (in-memory if unset)
        #[arg(long, env = "REDIS_URL")]
        redis_url: Option<String>,

        /// Only check external links
        #[arg(long)]
        external_only: bool,

        /// Maximum concurrent link checks
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Give up on the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Repository name recorded in broken link events
        #[arg(long, default_value = "")]
        repository: String,

        /// Build identifier recorded in broken link events
        #[arg(long, env = "BUILD_ID")]
        build_id: Option<String>,

        /// Output broken links as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}
