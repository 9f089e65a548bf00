//! # sift CLI
//!
//! Command-line front end for the discovery crawler. `sift discover` crawls
//! from one or more seed URLs and prints every HTML page and PDF document it
//! finds as a JSON line:
//!
//! ```text
//! {"url":"https://example.com/report.pdf","kind":"pdf"}
//! ```
//!
//! Settings come from an optional JSON config file, overridden by flags.
//! Per-domain rules are loaded from a JSON rules file. Ctrl-C stops the
//! crawl and keeps what was found so far.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use futures::stream::BoxStream;
use indicatif::{ProgressBar, ProgressStyle};
use sift::crawler::{CollectMode, CrawlConfig, Discovered, DomainRules, RuleBasedCrawler};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Discover HTML pages and PDF documents on websites", long_about = None)]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl from seed URLs and list what was found
    Discover(DiscoverArgs),
}

#[derive(Args, Debug)]
struct DiscoverArgs {
    /// Seed URLs
    #[arg(required = true)]
    seeds: Vec<String>,

    /// Maximum link distance from the seeds
    #[arg(short, long)]
    depth: Option<u32>,

    /// Stop after this many results
    #[arg(short = 'n', long)]
    max_total: Option<usize>,

    /// Maximum pages fetched per host
    #[arg(short = 'p', long)]
    per_domain: Option<usize>,

    /// Politeness delay in milliseconds
    #[arg(short, long)]
    rate: Option<u64>,

    /// Only crawl this domain and its subdomains
    #[arg(short, long, conflicts_with = "any_domain")]
    base_domain: Option<String>,

    /// Follow links to any host
    #[arg(long)]
    any_domain: bool,

    /// What to report: all, pdf-only or html-only
    #[arg(short, long)]
    mode: Option<CollectMode>,

    /// Only follow URLs matching this regex (repeatable)
    #[arg(long)]
    allow: Vec<String>,

    /// Never follow URLs matching this regex (repeatable)
    #[arg(long)]
    deny: Vec<String>,

    /// CSS selectors of layout regions to ignore (comma-separated)
    #[arg(short, long)]
    exclude: Option<String>,

    /// Honour robots.txt
    #[arg(long)]
    robots: bool,

    /// Number of concurrent workers; 1 crawls strictly breadth-first
    #[arg(short, long, default_value = "1")]
    workers: usize,

    /// JSON file with per-domain rules
    #[arg(long)]
    rules: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DiscoverArgs {
    fn crawl_config(&self) -> anyhow::Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::from_json_file(path)?,
            None => CrawlConfig::default(),
        };

        if let Some(depth) = self.depth {
            config.max_depth = depth;
        }
        if let Some(max_total) = self.max_total {
            config.max_total = max_total;
        }
        if let Some(per_domain) = self.per_domain {
            config.max_pages_per_domain = per_domain;
        }
        if let Some(rate) = self.rate {
            config.delay_ms = rate;
        }
        if let Some(domain) = &self.base_domain {
            config.base_domain = Some(domain.to_ascii_lowercase());
        }
        if self.any_domain {
            config.base_domain = None;
            config.same_domain_only = false;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(exclude) = &self.exclude {
            config.exclude_selectors = exclude
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        config.allow.extend(self.allow.iter().cloned());
        config.deny.extend(self.deny.iter().cloned());
        config.respect_robots_txt |= self.robots;

        if config.max_total == 0 {
            anyhow::bail!("--max-total must be at least 1");
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logs = telemetry::init_tracing_subscriber(cli.log_file.as_deref())?;

    match cli.command {
        Some(Commands::Discover(args)) => {
            discover_command(args).await?;
        }
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["sift", "--help"]);
        }
    }

    Ok(())
}

#[instrument(skip_all)]
async fn discover_command(args: DiscoverArgs) -> anyhow::Result<()> {
    let config = args.crawl_config()?;
    let rules = match &args.rules {
        Some(path) => DomainRules::from_json_file(path)?,
        None => DomainRules::new(),
    };
    info!(rules = rules.len(), workers = args.workers, "configured crawl");

    let (skip_tx, mut skip_rx) = mpsc::unbounded_channel();
    let crawler = Arc::new(RuleBasedCrawler::new(config, rules)?.with_diagnostics(skip_tx));

    let token = crawler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping crawl");
            token.cancel();
        }
    });

    let mut results: BoxStream<'_, Discovered> = if args.workers > 1 {
        crawler
            .clone()
            .discover_concurrent(&args.seeds, args.workers)?
            .boxed()
    } else {
        crawler.discover(&args.seeds)?.boxed()
    };

    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await?),
        None => Box::new(tokio::io::stdout()),
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let (mut found, mut pdfs, mut skipped) = (0usize, 0usize, 0usize);
    loop {
        tokio::select! {
            item = results.next() => {
                let Some(item) = item else { break };
                found += 1;
                if item.kind == sift::crawler::ResourceKind::Pdf {
                    pdfs += 1;
                }
                let mut line = serde_json::to_string(&item)?;
                line.push('\n');
                out.write_all(line.as_bytes()).await?;
            }
            Some(skip) = skip_rx.recv() => {
                debug!(url = %skip.url, reason = %skip.reason, "skipped");
                skipped += 1;
            }
        }
        spinner.set_message(format!("{found} found ({pdfs} PDF), {skipped} skipped"));
    }
    out.flush().await?;

    spinner.finish_with_message(format!(
        "Discovered {found} resources ({pdfs} PDF), skipped {skipped}"
    ));
    if let Some(path) = &args.output {
        eprintln!("Saved results to {}", path.display());
    }
    Ok(())
}
