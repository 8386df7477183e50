//! Site rule table and network settings.
//!
//! Every site-specific decision the pipeline makes (where to find the listing,
//! which links are headlines, which elements hold paragraphs, the category, and
//! the lead image) is data in a [`SiteRule`]. Adding a site means adding an
//! entry to the table, either in [`SiteRules::builtin`] or in a YAML file passed
//! with `--sites`:
//!
//! ```yaml
//! sites:
//!   - source_id: tech-crunch
//!     listing_url: https://techcrunch.com/
//!     base_origin: https://techcrunch.com
//!     domain: techcrunch.com
//!     listing_selector: a.loop-card__title-link
//!     paragraph_selector: p.wp-block-paragraph
//!     category_selector: a.is-taxonomy-category
//!     image_selector: img.wp-post-image
//! ```

use crate::error::{PipelineError, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Desktop browser user agent; several sites refuse the reqwest default.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Extraction rules for one news site.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SiteRule {
    /// Tag stored in the `source` column.
    pub source_id: String,
    /// Page that lists the latest headlines.
    pub listing_url: String,
    /// Origin relative listing links are resolved against.
    pub base_origin: String,
    /// Host suffix used to route article URLs back to this rule.
    pub domain: String,
    pub listing_selector: String,
    pub paragraph_selector: String,
    pub category_selector: String,
    pub image_selector: String,
}

impl SiteRule {
    /// Whether `url` is hosted on this site (exact host or any subdomain).
    pub fn matches_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let domain = self.domain.trim_start_matches('.');
        host == domain || host.ends_with(&format!(".{domain}"))
    }

    fn selectors(&self) -> [&str; 4] {
        [
            &self.listing_selector,
            &self.paragraph_selector,
            &self.category_selector,
            &self.image_selector,
        ]
    }
}

/// Ordered rule table. Order is the order sources are scraped and sampled in.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SiteRules {
    pub sites: Vec<SiteRule>,
}

impl SiteRules {
    /// The TechCrunch and Wired science rules the digest ships with.
    pub fn builtin() -> Self {
        Self {
            sites: vec![
                SiteRule {
                    source_id: "tech-crunch".to_string(),
                    listing_url: "https://techcrunch.com/".to_string(),
                    base_origin: "https://techcrunch.com".to_string(),
                    domain: "techcrunch.com".to_string(),
                    listing_selector: "a.loop-card__title-link".to_string(),
                    paragraph_selector: "p.wp-block-paragraph".to_string(),
                    category_selector: "a.is-taxonomy-category".to_string(),
                    image_selector: "img.wp-post-image".to_string(),
                },
                SiteRule {
                    source_id: "wired".to_string(),
                    listing_url: "https://www.wired.com/category/science/".to_string(),
                    base_origin: "https://www.wired.com".to_string(),
                    domain: "wired.com".to_string(),
                    listing_selector: "a.summary-item__hed-link".to_string(),
                    paragraph_selector: "p.paywall".to_string(),
                    category_selector: "a.rubric__link".to_string(),
                    image_selector: "img.responsive-image__image".to_string(),
                },
            ],
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let rules: SiteRules =
            serde_yaml::from_str(yaml).map_err(|e| PipelineError::Config(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let rules = Self::from_yaml_str(&yaml)?;
        info!(count = rules.sites.len(), "Loaded site rules");
        Ok(rules)
    }

    /// Reject tables with unparseable selectors or base origins up front so
    /// extraction never has to.
    pub fn validate(&self) -> Result<()> {
        for site in &self.sites {
            Url::parse(&site.base_origin).map_err(|e| {
                PipelineError::Config(format!("{}: bad base_origin: {e}", site.source_id))
            })?;
            for css in site.selectors() {
                selector(css)?;
            }
        }
        Ok(())
    }

    pub fn by_source(&self, source_id: &str) -> Option<&SiteRule> {
        self.sites.iter().find(|s| s.source_id == source_id)
    }

    pub fn for_url(&self, url: &str) -> Option<&SiteRule> {
        self.sites.iter().find(|s| s.matches_url(url))
    }
}

/// Parse a CSS selector, mapping the borrowed parse error into ours.
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PipelineError::Config(format!("bad selector {css:?}: {e}")))
}
