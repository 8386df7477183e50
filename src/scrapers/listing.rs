//! Headline extraction from listing pages.
//!
//! Each configured site has one listing page (the TechCrunch front page, the
//! Wired science section, ...). The site's `listing_selector` picks the
//! headline anchors; their text becomes the title and their `href`, resolved
//! against the site's `base_origin`, becomes the canonical article URL.

use crate::config::{SiteRules, selector};
use crate::models::{IngestionBatch, ListingItem};
use crate::scrapers::PageFetcher;
use crate::utils::resolve_link;
use itertools::Itertools;
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Extract headlines from a listing page of `source_id`.
///
/// Unknown sources yield nothing and a warning. Anchors without text or
/// without an `href` are skipped. Output follows document order.
pub fn extract(rules: &SiteRules, source_id: &str, html: &str) -> Vec<ListingItem> {
    let Some(rule) = rules.by_source(source_id) else {
        warn!(source = source_id, "Unknown source; no extraction rule");
        return Vec::new();
    };
    let base = match Url::parse(&rule.base_origin) {
        Ok(base) => base,
        Err(e) => {
            warn!(source = source_id, error = %e, "Invalid base origin");
            return Vec::new();
        }
    };
    let listing = match selector(&rule.listing_selector) {
        Ok(sel) => sel,
        Err(e) => {
            warn!(source = source_id, error = %e, "Invalid listing selector");
            return Vec::new();
        }
    };

    let document = Html::parse_document(html);
    document
        .select(&listing)
        .filter_map(|element| {
            let title = element.text().flat_map(str::split_whitespace).join(" ");
            let href = element.value().attr("href")?;
            if title.is_empty() {
                return None;
            }
            let url = resolve_link(&base, href)?;
            Some(ListingItem {
                title,
                url,
                source: rule.source_id.clone(),
            })
        })
        .collect()
}

/// Download every configured listing page and combine the headlines.
///
/// A listing page that fails to download is logged and skipped.
#[instrument(level = "info", skip_all)]
pub async fn scrape_sources<F: PageFetcher>(fetcher: &F, rules: &SiteRules) -> IngestionBatch {
    let mut batch = IngestionBatch::new();
    for site in &rules.sites {
        let html = match fetcher.fetch(&site.listing_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(source = %site.source_id, url = %site.listing_url, error = %e, "Listing fetch failed");
                continue;
            }
        };
        let items = extract(rules, &site.source_id, &html);
        info!(source = %site.source_id, count = items.len(), "Indexed headlines");
        batch.extend(items);
    }
    debug!(titles = ?batch.iter().map(|i| &i.title).collect::<Vec<_>>(), "Headlines");
    info!(count = batch.len(), "Scraped headlines from all sources");
    batch
}
