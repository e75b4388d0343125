// src/main.rs
// =============================================================================
// This is the entry point of the link-verifier binary.
//
// What happens here:
// 1. Parse command-line arguments using clap and set up logging
// 2. Load the config file (if any) and apply flag overrides
// 3. Discover the rendered pages and run one verification pass
// 4. Print broken links and exit with a proper code
//    (0 = all good, 1 = broken links found, 2 = error or cancelled)
// =============================================================================

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use link_verifier::crawl::{discover_pages, SiteLayout};
use link_verifier::{
    deadline_token, BrokenLink, CacheBackend, LinkVerifier, MemoryCache, RedisCache, RedisOptions,
    RunSummary, VerifierConfig,
};

// Cap for the Redis event stream when run from the CLI
const STREAM_MAX_LEN: usize = 10_000;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("link_verifier=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            2
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            output_dir,
            base_url,
            content_dir,
            config,
            redis_url,
            external_only,
            max_concurrent,
            timeout_secs,
            repository,
            build_id,
            json,
        } => {
            let mut settings = match &config {
                Some(path) => VerifierConfig::from_file(path)?,
                None => VerifierConfig::default(),
            };
            if redis_url.is_some() {
                settings.redis_url = redis_url;
            }
            if external_only {
                settings.verify_external_only = true;
            }
            if let Some(n) = max_concurrent {
                settings.max_concurrent = n;
            }

            let build_time = Utc::now();
            let layout = SiteLayout {
                output_dir,
                base_url,
                content_dir,
                repository,
                build_id: build_id.unwrap_or_else(|| build_time.format("%Y%m%d%H%M%S").to_string()),
                build_time,
            };
            handle_verify(settings, layout, timeout_secs, json).await
        }
    }
}

async fn handle_verify(
    settings: VerifierConfig,
    layout: SiteLayout,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<i32> {
    settings.validate()?;

    let cache: Arc<dyn CacheBackend> = match &settings.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(RedisOptions {
                url: url.clone(),
                key_prefix: settings.key_prefix.clone(),
                event_stream: settings.event_stream.clone(),
                stream_max_len: Some(STREAM_MAX_LEN),
                ttls: settings.ttls(),
            })
            .await?,
        ),
        None => Arc::new(MemoryCache::new(settings.ttls())),
    };

    let pages = discover_pages(&layout)
        .with_context(|| format!("scanning {}", layout.output_dir.display()))?;
    if pages.is_empty() {
        warn!(dir = %layout.output_dir.display(), "no rendered pages found");
        return Ok(0);
    }
    info!(pages = pages.len(), "verifying rendered site");

    let verifier = LinkVerifier::new(&settings, cache.clone())?;

    // Ctrl-C and --timeout-secs both cancel the run
    let root = CancellationToken::new();
    let cancel = match timeout_secs {
        Some(secs) => deadline_token(&root, Duration::from_secs(secs)),
        None => root.child_token(),
    };
    let on_signal = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling verification");
            on_signal.cancel();
        }
    });

    let result = verifier.verify_pages(&cancel, pages).await;
    cache.close().await;
    let summary = result?;

    print_results(&summary, json)?;

    if summary.broken.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}

fn print_results(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print_table(&summary.broken);
        print_summary(summary);
    }
    Ok(())
}

fn print_table(broken: &[BrokenLink]) {
    if broken.is_empty() {
        return;
    }
    println!("{:<60} {:<30} {:<8} {:<30}", "URL", "PAGE", "STATUS", "ERROR");
    println!("{}", "=".repeat(130));

    for link in broken {
        println!(
            "{:<60} {:<30} {:<8} {:<30}",
            truncate(&link.url, 57),
            truncate(&link.page, 27),
            link.status,
            link.error
        );
    }
    println!();
}

fn print_summary(summary: &RunSummary) {
    println!("Summary:");
    println!("   Pages:          {}", summary.pages);
    println!("   Unchanged:      {}", summary.pages_unchanged);
    println!("   Skipped:        {}", summary.pages_failed);
    println!("   Links checked:  {}", summary.links_checked);
    println!("   From cache:     {}", summary.cache_hits);
    println!("   Broken:         {}", summary.broken.len());
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
