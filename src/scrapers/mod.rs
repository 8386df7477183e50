//! Page retrieval and HTML extraction for the configured news sites.
//!
//! Scraping happens in two places in a run:
//!
//! 1. **Listing**: [`listing`] downloads each site's listing page and turns the
//!    headline links into an [`IngestionBatch`](crate::models::IngestionBatch)
//! 2. **Article pages**: [`article`] downloads individual articles to pull the
//!    body text, the category and the lead image
//!
//! Both go through the [`PageFetcher`] seam, so everything above the HTTP
//! client can be exercised against canned HTML. All site-specific behaviour
//! comes from the [`SiteRules`](crate::config::SiteRules) table.
//!
//! Failures are never fatal here: a page that cannot be downloaded is logged
//! and yields an empty result.

use crate::config::USER_AGENT;
use crate::error::Result;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};

pub mod article;
pub mod listing;

/// Something that can turn a URL into page markup.
pub trait PageFetcher {
    /// Download `url` and return the body. Non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`PageFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a client with the desktop user agent and a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::PageFetcher;
    use crate::error::{PipelineError, Result};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned pages and records every URL requested.
    #[derive(Debug, Default)]
    pub struct StubFetcher {
        pages: HashMap<String, String>,
        pub requests: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn request_count(&self, url: &str) -> usize {
            self.requests.borrow().iter().filter(|u| *u == url).count()
        }
    }

    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.requests.borrow_mut().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::InvalidRecord(format!("404 for {url}")))
        }
    }
}
