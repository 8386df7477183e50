//! The incremental article pipeline.
//!
//! One call to [`Pipeline::run`] walks
//!
//! ```text
//! START -> SCRAPE -> CLASSIFY -> PERSIST -> BACKFILL -> DONE
//! ```
//!
//! - **Scrape**: headlines from every configured listing page; nothing scraped
//!   ends the run
//! - **Classify**: a per-source capped sample is scored in one model call
//! - **Persist**: scored headlines are enriched from their article page and
//!   upserted in one transaction
//! - **Backfill**: every relevant row without a summary gets content (stored or
//!   fetched) and a summary, one article at a time
//!
//! Nothing about a run is remembered except what reaches the store. Running
//! again re-scrapes from scratch, merges into the same rows and, because the
//! backfill only selects rows without a summary, never summarizes twice.

use crate::api::AskAsync;
use crate::classifier::RelevanceClassifier;
use crate::config::SiteRules;
use crate::models::{ArticleRecord, IngestionBatch, PendingArticle};
use crate::scrapers::PageFetcher;
use crate::scrapers::article::ContentFetcher;
use crate::scrapers::listing::scrape_sources;
use crate::store::Store;
use crate::summarizer::Summarizer;
use crate::utils::{is_addressable_url, truncate_for_log};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};

/// Tunables of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    /// Minimum relevance for an article to be summarized.
    pub threshold: f64,
    /// Headlines per source forwarded to the classifier.
    pub per_source: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            per_source: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Scrape,
    Classify,
    Persist,
    Backfill,
    Done,
}

/// What one run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub scraped: usize,
    pub sampled: usize,
    pub classified: usize,
    pub persisted: usize,
    pub pending: usize,
    pub summarized: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackfillOutcome {
    Summarized,
    InvalidUrl,
    NoContent,
    NoSummary,
    WriteFailed,
}

/// Sequences extraction, scoring, persistence and summary backfill.
pub struct Pipeline<'a, F, C, S> {
    store: &'a Store,
    fetcher: &'a F,
    rules: &'a SiteRules,
    classifier: RelevanceClassifier<C>,
    summarizer: Summarizer<S>,
    settings: RunSettings,
}

impl<'a, F, C, S> Pipeline<'a, F, C, S>
where
    F: PageFetcher,
    C: AskAsync<Response = String>,
    S: AskAsync<Response = String>,
{
    pub fn new(
        store: &'a Store,
        fetcher: &'a F,
        rules: &'a SiteRules,
        classifier: RelevanceClassifier<C>,
        summarizer: Summarizer<S>,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            rules,
            classifier,
            summarizer,
            settings,
        }
    }

    fn content(&self) -> ContentFetcher<'a, F> {
        ContentFetcher::new(self.fetcher, self.rules)
    }

    /// Run every phase once. Individual failures are logged and never end
    /// the run early.
    #[instrument(level = "info", skip_all, fields(threshold = self.settings.threshold, per_source = self.settings.per_source))]
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        let mut batch = IngestionBatch::new();
        let mut sample = Vec::new();
        let mut scores = HashMap::new();
        let mut phase = Phase::Start;

        loop {
            debug!(?phase, "Entering phase");
            phase = match phase {
                Phase::Start => Phase::Scrape,
                Phase::Scrape => {
                    batch = scrape_sources(self.fetcher, self.rules).await;
                    report.scraped = batch.len();
                    if batch.is_empty() {
                        warn!("No articles were scraped");
                        Phase::Done
                    } else {
                        Phase::Classify
                    }
                }
                Phase::Classify => {
                    sample = batch.balanced_sample(self.settings.per_source);
                    report.sampled = sample.len();
                    scores = self.classifier.classify(&sample).await;
                    report.classified = scores.len();
                    Phase::Persist
                }
                Phase::Persist => {
                    report.persisted = self.persist(&batch, &sample, &scores).await;
                    Phase::Backfill
                }
                Phase::Backfill => {
                    self.backfill(&mut report).await;
                    Phase::Done
                }
                Phase::Done => break,
            };
        }

        info!(?report, "Pipeline run complete");
        report
    }

    /// Enrich and upsert every scored headline. Returns rows written.
    #[instrument(level = "info", skip_all, fields(count = scores.len()))]
    async fn persist(
        &self,
        batch: &IngestionBatch,
        sample: &[String],
        scores: &HashMap<String, f64>,
    ) -> usize {
        if scores.is_empty() {
            info!("Nothing classified; nothing to persist");
            return 0;
        }

        let content = self.content();
        let mut records = Vec::with_capacity(scores.len());
        for title in sample {
            let Some(&score) = scores.get(title) else {
                continue;
            };
            let Some(item) = batch.get(title) else {
                warn!(%title, "Scored title missing from scrape batch");
                continue;
            };

            let record = ArticleRecord::scored(item, Some(score));
            let already_fetched = match self.store.has_content(&item.url).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(url = %item.url, error = %e, "Lookup failed; fetching page again");
                    false
                }
            };
            let record = if already_fetched {
                debug!(url = %item.url, "Content already stored; skipping enrichment");
                record
            } else {
                record.with_enrichment(content.enrich(&item.url).await)
            };
            records.push(record);
        }

        match self.store.upsert(&records).await {
            Ok(outcome) => outcome.inserted + outcome.updated,
            Err(e) => {
                error!(count = records.len(), error = %e, "Persisting scored articles failed");
                0
            }
        }
    }

    /// Fetch content and write summaries for every pending article.
    #[instrument(level = "info", skip_all)]
    async fn backfill(&self, report: &mut RunReport) {
        let pending = match self.store.select_pending_summary(self.settings.threshold).await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Could not select articles pending summary");
                return;
            }
        };
        report.pending = pending.len();
        if pending.is_empty() {
            info!("No relevant articles without summaries found");
            return;
        }

        let outcomes: Vec<BackfillOutcome> = stream::iter(pending)
            .then(|article| async move { self.backfill_one(&article).await })
            .collect()
            .await;

        report.summarized = outcomes
            .iter()
            .filter(|o| **o == BackfillOutcome::Summarized)
            .count();
        report.skipped = outcomes.len() - report.summarized;
    }

    #[instrument(level = "info", skip_all, fields(url = %article.url, relevance = article.relevance_score))]
    async fn backfill_one(&self, article: &PendingArticle) -> BackfillOutcome {
        let url = article.url.as_str();
        if !is_addressable_url(url) {
            warn!(title = %article.title, "Skipping article with invalid URL");
            return BackfillOutcome::InvalidUrl;
        }

        let content = match article.content.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(stored) => stored.to_string(),
            None => {
                let fetched = self.content().fetch_content(url).await;
                if !fetched.is_empty() {
                    if let Err(e) = self.store.update_content(url, &fetched).await {
                        warn!(error = %e, "Could not persist fetched content");
                    }
                }
                fetched
            }
        };
        if content.is_empty() {
            warn!(title = %article.title, "Could not fetch content");
            return BackfillOutcome::NoContent;
        }

        let summary = self.summarizer.summarize(&content).await;
        if summary.is_empty() {
            warn!(title = %article.title, "Could not generate summary");
            return BackfillOutcome::NoSummary;
        }

        match self.store.update_summary(url, &summary).await {
            Ok(true) => {
                info!(summary = %truncate_for_log(&summary, 80), "Summary saved");
                BackfillOutcome::Summarized
            }
            Ok(false) => {
                warn!("Article row vanished before its summary was saved");
                BackfillOutcome::WriteFailed
            }
            Err(e) => {
                warn!(error = %e, "Could not save summary");
                BackfillOutcome::WriteFailed
            }
        }
    }
}
