//! Article page extraction: body text, category and lead image.
//!
//! The site rule is picked by matching the article URL's host against the
//! configured domains. When no rule matches, or the site's selector finds
//! nothing, generic selectors take over:
//!
//! | Field    | Site selector        | Fallbacks                                  |
//! |----------|----------------------|--------------------------------------------|
//! | content  | `paragraph_selector` | `article p`, then every `p` on the page    |
//! | category | `category_selector`  | `rel="category tag"`, `/category/`, `/tag/` links |
//! | image    | `image_selector`     | first `article img`                        |
//!
//! The three fetches are independent: each downloads the page on its own and a
//! failure of one never affects the others.

use crate::config::{SiteRule, SiteRules, selector};
use crate::models::Enrichment;
use crate::scrapers::PageFetcher;
use crate::utils::{is_addressable_url, resolve_link};
use itertools::Itertools;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument, warn};
use url::Url;

const FALLBACK_PARAGRAPHS: [&str; 2] = ["article p", "p"];
const FALLBACK_CATEGORY: &str = "a[rel='category tag'], a[href*='/category/'], a[href*='/tag/']";
const FALLBACK_IMAGE: &str = "article img";

/// Fetches article pages and applies the site rule table to them.
#[derive(Debug)]
pub struct ContentFetcher<'a, F> {
    fetcher: &'a F,
    rules: &'a SiteRules,
}

impl<'a, F: PageFetcher> ContentFetcher<'a, F> {
    pub fn new(fetcher: &'a F, rules: &'a SiteRules) -> Self {
        Self { fetcher, rules }
    }

    async fn page(&self, url: &str, operation: &str) -> Option<String> {
        if !is_addressable_url(url) {
            warn!(%url, operation, "Skipping fetch of invalid URL");
            return None;
        }
        match self.fetcher.fetch(url).await {
            Ok(html) => Some(html),
            Err(e) => {
                warn!(%url, operation, error = %e, "Article fetch failed");
                None
            }
        }
    }

    /// Full article text, or an empty string when nothing could be fetched.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_content(&self, url: &str) -> String {
        let Some(html) = self.page(url, "fetch_content").await else {
            return String::new();
        };
        let content = extract_content(self.rules.for_url(url), &html);
        debug!(bytes = content.len(), "Extracted article content");
        content
    }

    #[instrument(level = "info", skip(self))]
    pub async fn fetch_category(&self, url: &str) -> Option<String> {
        let html = self.page(url, "fetch_category").await?;
        extract_category(self.rules.for_url(url), &html)
    }

    /// Lead image URL and alt text; either may be missing.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_image(&self, url: &str) -> (Option<String>, Option<String>) {
        let Some(html) = self.page(url, "fetch_image").await else {
            return (None, None);
        };
        extract_image(self.rules.for_url(url), url, &html)
    }

    /// Run all three fetches for one article.
    pub async fn enrich(&self, url: &str) -> Enrichment {
        let category = self.fetch_category(url).await;
        let content = Some(self.fetch_content(url).await).filter(|c| !c.is_empty());
        let (image_url, image_alt) = self.fetch_image(url).await;
        Enrichment {
            category,
            content,
            image_url,
            image_alt,
        }
    }
}

fn clean_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).join(" ")
}

/// Select with a CSS string, treating an invalid selector as "no match".
fn select_all<'d>(document: &'d Html, css: &str) -> Vec<ElementRef<'d>> {
    match selector(css) {
        Ok(sel) => document.select(&sel).collect(),
        Err(e) => {
            warn!(error = %e, "Skipping invalid selector");
            Vec::new()
        }
    }
}

fn paragraphs_text(document: &Html, css: &str) -> String {
    select_all(document, css)
        .into_iter()
        .map(clean_text)
        .filter(|t| !t.is_empty())
        .join(" ")
}

/// Article body text: site paragraphs, else paragraphs inside `<article>`,
/// else every paragraph on the page.
pub fn extract_content(rule: Option<&SiteRule>, html: &str) -> String {
    let document = Html::parse_document(html);
    rule.map(|r| r.paragraph_selector.as_str())
        .into_iter()
        .chain(FALLBACK_PARAGRAPHS)
        .map(|css| paragraphs_text(&document, css))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

pub fn extract_category(rule: Option<&SiteRule>, html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    rule.map(|r| r.category_selector.as_str())
        .into_iter()
        .chain([FALLBACK_CATEGORY])
        .find_map(|css| {
            select_all(&document, css)
                .into_iter()
                .next()
                .map(clean_text)
                .filter(|t| !t.is_empty())
        })
}

/// Lead image of the page at `page_url`, with `src` (or `data-src`) made
/// absolute.
pub fn extract_image(
    rule: Option<&SiteRule>,
    page_url: &str,
    html: &str,
) -> (Option<String>, Option<String>) {
    let document = Html::parse_document(html);
    let image = rule
        .map(|r| r.image_selector.as_str())
        .into_iter()
        .chain([FALLBACK_IMAGE])
        .find_map(|css| select_all(&document, css).into_iter().next());

    let Some(image) = image else {
        return (None, None);
    };
    let attrs = image.value();
    let alt = attrs
        .attr("alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    let src = attrs
        .attr("src")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| attrs.attr("data-src").map(str::trim))
        .filter(|s| !s.is_empty());

    let src = src.and_then(|src| normalize_image_src(page_url, src));
    (src, alt)
}

fn normalize_image_src(page_url: &str, src: &str) -> Option<String> {
    if src.starts_with("//") || src.starts_with('/') {
        let base = Url::parse(page_url).ok()?;
        return resolve_link(&base, src);
    }
    Some(src.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::StubFetcher;

    const TECHCRUNCH_ARTICLE: &str = r#"
        <html><body>
          <a class="is-taxonomy-category" href="/category/ai/">AI</a>
          <img class="wp-post-image" src="https://techcrunch.com/wp-content/uploads/chip.jpg" alt="A chip">
          <article>
            <p class="wp-block-paragraph">First paragraph.</p>
            <p>Related links</p>
            <p class="wp-block-paragraph">Second
               paragraph.</p>
          </article>
        </body></html>
    "#;

    const GENERIC_ARTICLE: &str = r#"
        <html><body>
          <p>Cookie banner</p>
          <article>
            <a rel="category tag" href="/topics/security">Security</a>
            <img data-src="//cdn.example.com/lead.png" alt="">
            <p>Body one.</p>
            <p>Body two.</p>
          </article>
        </body></html>
    "#;

    const BARE_PAGE: &str = r#"
        <html><body>
          <div><p>Loose one.</p><p>Loose two.</p></div>
        </body></html>
    "#;

    #[test]
    fn test_extract_content_site_rule() {
        let rules = SiteRules::builtin();
        let rule = rules.for_url("https://techcrunch.com/2025/01/01/chips/");
        assert_eq!(
            extract_content(rule, TECHCRUNCH_ARTICLE),
            "First paragraph. Second paragraph."
        );
    }

    #[test]
    fn test_extract_content_falls_back_to_article_container() {
        assert_eq!(extract_content(None, GENERIC_ARTICLE), "Body one. Body two.");
    }

    #[test]
    fn test_extract_content_falls_back_to_all_paragraphs() {
        assert_eq!(extract_content(None, BARE_PAGE), "Loose one. Loose two.");
    }

    #[test]
    fn test_extract_content_site_rule_empty_uses_fallback() {
        let rules = SiteRules::builtin();
        let rule = rules.for_url("https://www.wired.com/story/x/");
        assert_eq!(extract_content(rule, GENERIC_ARTICLE), "Body one. Body two.");
    }

    #[test]
    fn test_extract_category() {
        let rules = SiteRules::builtin();
        let tc = rules.for_url("https://techcrunch.com/a");
        assert_eq!(extract_category(tc, TECHCRUNCH_ARTICLE).as_deref(), Some("AI"));
        assert_eq!(
            extract_category(None, GENERIC_ARTICLE).as_deref(),
            Some("Security")
        );
        assert_eq!(extract_category(None, BARE_PAGE), None);
    }

    #[test]
    fn test_extract_image() {
        let rules = SiteRules::builtin();
        let tc = rules.for_url("https://techcrunch.com/a");
        assert_eq!(
            extract_image(tc, "https://techcrunch.com/a", TECHCRUNCH_ARTICLE),
            (
                Some("https://techcrunch.com/wp-content/uploads/chip.jpg".to_string()),
                Some("A chip".to_string())
            )
        );
        assert_eq!(
            extract_image(None, "https://example.com/post", GENERIC_ARTICLE),
            (Some("https://cdn.example.com/lead.png".to_string()), None)
        );
        assert_eq!(extract_image(None, "https://example.com/post", BARE_PAGE), (None, None));
    }

    #[test]
    fn test_normalize_image_src() {
        assert_eq!(
            normalize_image_src("https://www.wired.com/story/x/", "/photos/a.jpg").as_deref(),
            Some("https://www.wired.com/photos/a.jpg")
        );
        assert_eq!(
            normalize_image_src("https://www.wired.com/story/x/", "https://media.wired.com/a.jpg")
                .as_deref(),
            Some("https://media.wired.com/a.jpg")
        );
    }

    #[tokio::test]
    async fn test_fetch_failures_yield_empty_results() {
        let rules = SiteRules::builtin();
        let fetcher = StubFetcher::new();
        let content = ContentFetcher::new(&fetcher, &rules);
        let url = "https://techcrunch.com/missing";

        assert_eq!(content.fetch_content(url).await, "");
        assert_eq!(content.fetch_category(url).await, None);
        assert_eq!(content.fetch_image(url).await, (None, None));
        assert_eq!(fetcher.request_count(url), 3);
    }

    #[tokio::test]
    async fn test_invalid_url_is_never_requested() {
        let rules = SiteRules::builtin();
        let fetcher = StubFetcher::new();
        let content = ContentFetcher::new(&fetcher, &rules);

        assert_eq!(content.enrich("not-a-url").await, Enrichment::default());
        assert!(fetcher.requests.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_collects_all_fields() {
        let rules = SiteRules::builtin();
        let url = "https://techcrunch.com/2025/01/01/chips/";
        let fetcher = StubFetcher::new().with_page(url, TECHCRUNCH_ARTICLE);
        let content = ContentFetcher::new(&fetcher, &rules);

        let enrichment = content.enrich(url).await;
        assert_eq!(enrichment.category.as_deref(), Some("AI"));
        assert_eq!(
            enrichment.content.as_deref(),
            Some("First paragraph. Second paragraph.")
        );
        assert_eq!(enrichment.image_alt.as_deref(), Some("A chip"));
    }
}
