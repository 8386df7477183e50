//! Data models for scraped headlines and persisted articles.
//!
//! - [`ListingItem`]: one headline pulled from a site's listing page
//! - [`IngestionBatch`]: the title-keyed set of headlines from one scrape
//! - [`ArticleRecord`]: what a pipeline run wants written for one URL
//! - [`Article`]: a row of the `articles` table
//! - [`PendingArticle`]: a relevant row still waiting for its summary
//!
//! [`merge`] is the reconciliation policy applied when a URL is ingested again.

use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

/// A headline as found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub title: String,
    /// Absolute article URL.
    pub url: String,
    /// `source_id` of the site rule that produced it.
    pub source: String,
}

/// Headlines from one scrape, keyed by title.
///
/// Insertion order is kept. Inserting a title that is already present replaces
/// the earlier entry in place, so two sources publishing the same headline
/// yield one entry pointing at whichever was scraped last.
#[derive(Debug, Default, Clone)]
pub struct IngestionBatch {
    items: Vec<ListingItem>,
    index: HashMap<String, usize>,
}

impl IngestionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: ListingItem) {
        match self.index.get(&item.title) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.index.insert(item.title.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = ListingItem>) {
        for item in items {
            self.insert(item);
        }
    }

    pub fn get(&self, title: &str) -> Option<&ListingItem> {
        self.index.get(title).map(|&pos| &self.items[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListingItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Up to `per_source` titles from each source, sources in the order they
    /// first appear, each source's titles in document order.
    pub fn balanced_sample(&self, per_source: usize) -> Vec<String> {
        let sources = self.items.iter().map(|i| i.source.as_str()).unique();
        sources
            .flat_map(|source| {
                self.items
                    .iter()
                    .filter(move |i| i.source == source)
                    .take(per_source)
                    .map(|i| i.title.clone())
            })
            .collect()
    }
}

/// Data fetched from an article page to enrich its row. Also the part of a
/// stored row that [`merge`] reads.
#[derive(Debug, Default, Clone, PartialEq, sqlx::FromRow)]
pub struct Enrichment {
    pub category: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
}

/// An incoming write for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub source: Option<String>,
    pub relevance_score: Option<f64>,
    pub category: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
}

impl ArticleRecord {
    /// A scored headline with no enrichment yet.
    pub fn scored(item: &ListingItem, relevance_score: Option<f64>) -> Self {
        Self {
            url: item.url.clone(),
            title: item.title.clone(),
            source: Some(item.source.clone()),
            relevance_score,
            category: None,
            content: None,
            image_url: None,
            image_alt: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.category = enrichment.category;
        self.content = enrichment.content;
        self.image_url = enrichment.image_url;
        self.image_alt = enrichment.image_alt;
        self
    }
}

/// A row of the `articles` table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub source: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub relevance_score: Option<f64>,
    pub category: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// A relevant article that still has no summary.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PendingArticle {
    pub title: String,
    pub url: String,
    pub relevance_score: f64,
    pub content: Option<String>,
}

/// Reconcile the stored enrichment of a URL with a newer ingestion of it.
///
/// `title`, `source` and `relevance_score` take the incoming values.
/// Enrichment fields only take the incoming value when it is present, so a
/// run that failed to fetch the page never erases earlier data. The result is
/// what gets written back; `id`, `created_at` and `summary` are not part of it.
pub fn merge(existing: &Enrichment, incoming: &ArticleRecord) -> ArticleRecord {
    ArticleRecord {
        url: incoming.url.clone(),
        title: incoming.title.clone(),
        source: incoming.source.clone(),
        relevance_score: incoming.relevance_score,
        category: incoming.category.clone().or_else(|| existing.category.clone()),
        content: incoming.content.clone().or_else(|| existing.content.clone()),
        image_url: incoming.image_url.clone().or_else(|| existing.image_url.clone()),
        image_alt: incoming.image_alt.clone().or_else(|| existing.image_alt.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, source: &str) -> ListingItem {
        ListingItem {
            title: title.to_string(),
            url: url.to_string(),
            source: source.to_string(),
        }
    }

    fn existing() -> Enrichment {
        Enrichment {
            category: Some("AI".to_string()),
            content: None,
            image_url: Some("https://media.wired.com/a.jpg".to_string()),
            image_alt: None,
        }
    }

    fn incoming() -> ArticleRecord {
        ArticleRecord {
            url: "https://www.wired.com/story/a".to_string(),
            title: "New title".to_string(),
            source: Some("wired".to_string()),
            relevance_score: Some(8.0),
            category: None,
            content: Some("text".to_string()),
            image_url: None,
            image_alt: Some("A robot".to_string()),
        }
    }

    #[test]
    fn test_merge_keeps_existing_enrichment_over_null() {
        let merged = merge(&existing(), &incoming());
        assert_eq!(merged.category.as_deref(), Some("AI"));
        assert_eq!(merged.content.as_deref(), Some("text"));
        assert_eq!(
            merged.image_url.as_deref(),
            Some("https://media.wired.com/a.jpg")
        );
        assert_eq!(merged.image_alt.as_deref(), Some("A robot"));
    }

    #[test]
    fn test_merge_overwrites_scalars() {
        let merged = merge(&existing(), &incoming());
        assert_eq!(merged.title, "New title");
        assert_eq!(merged.relevance_score, Some(8.0));
        assert_eq!(merged.url, "https://www.wired.com/story/a");
    }

    #[test]
    fn test_merge_incoming_enrichment_wins_when_present() {
        let mut record = incoming();
        record.category = Some("Security".to_string());
        let merged = merge(&existing(), &record);
        assert_eq!(merged.category.as_deref(), Some("Security"));
    }

    #[test]
    fn test_batch_title_collision_overwrites_in_place() {
        let mut batch = IngestionBatch::new();
        batch.insert(item("A", "https://techcrunch.com/a", "tech-crunch"));
        batch.insert(item("B", "https://techcrunch.com/b", "tech-crunch"));
        batch.insert(item("A", "https://www.wired.com/a", "wired"));

        assert_eq!(batch.len(), 2);
        let titles: Vec<_> = batch.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(batch.get("A").unwrap().source, "wired");
    }

    #[test]
    fn test_balanced_sample_caps_each_source() {
        let mut batch = IngestionBatch::new();
        batch.extend([
            item("T1", "https://techcrunch.com/1", "tech-crunch"),
            item("T2", "https://techcrunch.com/2", "tech-crunch"),
            item("T3", "https://techcrunch.com/3", "tech-crunch"),
            item("W1", "https://www.wired.com/1", "wired"),
            item("W2", "https://www.wired.com/2", "wired"),
        ]);

        assert_eq!(batch.balanced_sample(2), vec!["T1", "T2", "W1", "W2"]);
        assert_eq!(batch.balanced_sample(1), vec!["T1", "W1"]);
        assert!(batch.balanced_sample(0).is_empty());
    }
}
