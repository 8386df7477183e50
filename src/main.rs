//! # Tech News Digest
//!
//! An incremental pipeline that collects headlines from tech news sites,
//! asks a language model which ones matter to computer-science students,
//! keeps them in SQLite and backfills short plain-language summaries for the
//! relevant ones.
//!
//! ## Usage
//!
//! ```sh
//! tech_news_digest -d news.db run --threshold 5 --per-source 10
//! tech_news_digest -d news.db list --limit 20
//! ```
//!
//! ## Architecture
//!
//! 1. **Scrape**: headline links from each site's listing page
//! 2. **Classify**: one model call scores a per-source sample of headlines
//! 3. **Persist**: scored headlines are enriched and upserted by URL
//! 4. **Backfill**: relevant articles without a summary get one
//!
//! Re-running is safe: rows are merged by URL and summarized rows are never
//! selected again.

use awful_aj::{config as aj_config, config_dir, template};
use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod classifier;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod scrapers;
mod store;
mod summarizer;
mod utils;

use classifier::RelevanceClassifier;
use cli::{Cli, Command, ListArgs, RunArgs};
use config::SiteRules;
use pipeline::{Pipeline, RunSettings};
use scrapers::HttpFetcher;
use store::Store;
use summarizer::Summarizer;
use utils::ensure_parent_dir;

const RELEVANCE_TEMPLATE: &str = "tech_news_relevance";
const SUMMARY_TEMPLATE: &str = "tech_news_summary";
const STRICT_SUMMARY_TEMPLATE: &str = "tech_news_summary_strict";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("tech_news_digest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // The store is the only thing a run cannot do without.
    ensure_parent_dir(&args.database).await?;
    let store = match Store::open(&args.database).await {
        Ok(store) => store,
        Err(e) => {
            error!(path = %args.database.display(), error = %e, "Could not open article store");
            return Err(e.into());
        }
    };

    let result = match args.command.clone().unwrap_or_default() {
        Command::Run(run) => run_pipeline(&args, &run, &store).await,
        Command::List(list) => list_articles(&store, &list).await,
    };
    store.close().await;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    result
}

#[instrument(level = "info", skip_all)]
async fn run_pipeline(args: &Cli, run: &RunArgs, store: &Store) -> Result<(), Box<dyn Error>> {
    let rules = match &args.sites {
        Some(path) => SiteRules::load(path).await?,
        None => SiteRules::builtin(),
    };
    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout_secs))?;

    // ---- Load model config & templates ----
    let conf_file = match &args.config {
        Some(path) => path.clone(),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("config path is not valid UTF-8")?;
    let config = aj_config::load_config(config_path)?;
    info!(config_path, "Loaded configuration");

    let relevance = template::load_template(RELEVANCE_TEMPLATE).await?;
    let summary = template::load_template(SUMMARY_TEMPLATE).await?;
    let strict_summary = template::load_template(STRICT_SUMMARY_TEMPLATE).await?;
    info!("Loaded relevance and summary templates");

    let pipeline = Pipeline::new(
        store,
        &fetcher,
        &rules,
        RelevanceClassifier::new(api::oracle(&config, &relevance, run.max_retries)),
        Summarizer::new(
            api::oracle(&config, &summary, run.max_retries),
            api::oracle(&config, &strict_summary, run.max_retries),
        ),
        RunSettings {
            threshold: run.threshold,
            per_source: run.per_source,
        },
    );
    let report = pipeline.run().await;
    info!(
        scraped = report.scraped,
        classified = report.classified,
        persisted = report.persisted,
        summarized = report.summarized,
        skipped = report.skipped,
        "Workflow complete"
    );
    Ok(())
}

#[instrument(level = "info", skip_all)]
async fn list_articles(store: &Store, list: &ListArgs) -> Result<(), Box<dyn Error>> {
    let articles = store
        .recent(list.min_relevance, list.limit, list.offset)
        .await?;
    info!(count = articles.len(), "Listing articles");
    println!("{}", serde_json::to_string_pretty(&articles)?);
    Ok(())
}
