//! Plain-language article summaries.
//!
//! Summaries are meant for undergraduates, so names and jargon should carry a
//! bracketed gloss such as `[Rust is a systems programming language]`. When the
//! first answer has no gloss at all, the article is sent once more with the
//! stricter template. The gloss is a nicety: if the second answer has none
//! either, the first answer is kept.

use crate::api::AskAsync;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};

static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]\n]+\]").expect("annotation pattern is valid"));

/// Whether `summary` contains at least one bracketed gloss.
pub fn has_annotations(summary: &str) -> bool {
    ANNOTATION.is_match(summary)
}

/// Summarizes article text with a primary and a stricter instruction.
#[derive(Debug)]
pub struct Summarizer<A> {
    primary: A,
    strict: A,
}

impl<A> Summarizer<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(primary: A, strict: A) -> Self {
        Self { primary, strict }
    }

    #[cfg(test)]
    pub(crate) fn primary(&self) -> &A {
        &self.primary
    }

    /// Summary of `text`, or an empty string when the model is unreachable.
    #[instrument(level = "info", skip_all, fields(bytes = text.len()))]
    pub async fn summarize(&self, text: &str) -> String {
        let first = match self.primary.ask(text).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Summary request failed");
                return String::new();
            }
        };
        if has_annotations(&first) {
            return first;
        }

        info!("Summary lacks bracketed glosses; asking once more");
        match self.strict.ask(text).await {
            Ok(second) if has_annotations(&second) => second.trim().to_string(),
            Ok(_) => {
                warn!("Retry still lacks glosses; keeping first summary");
                first
            }
            Err(e) => {
                warn!(error = %e, "Summary retry failed; keeping first summary");
                first
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedAsk;

    #[test]
    fn test_has_annotations() {
        assert!(has_annotations("OpenAI [an AI research lab] shipped a model."));
        assert!(!has_annotations("No glosses here."));
        assert!(!has_annotations("Empty [] brackets"));
        assert!(!has_annotations(""));
    }

    #[tokio::test]
    async fn test_conforming_first_answer_needs_no_retry() {
        let summarizer = Summarizer::new(
            ScriptedAsk::new().answer(" Rust [a systems language] reached the kernel. "),
            ScriptedAsk::new(),
        );

        let summary = summarizer.summarize("article").await;

        assert_eq!(summary, "Rust [a systems language] reached the kernel.");
        assert_eq!(summarizer.strict.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_glosses_trigger_exactly_one_retry() {
        let summarizer = Summarizer::new(
            ScriptedAsk::new().answer("Rust reached the kernel."),
            ScriptedAsk::new().answer("Rust [a systems language] reached the kernel."),
        );

        let summary = summarizer.summarize("article").await;

        assert_eq!(summary, "Rust [a systems language] reached the kernel.");
        assert_eq!(summarizer.primary.calls(), 1);
        assert_eq!(summarizer.strict.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_first_answer() {
        let summarizer = Summarizer::new(
            ScriptedAsk::new().answer("First answer."),
            ScriptedAsk::new().answer("Second answer.").answer("Never asked."),
        );

        assert_eq!(summarizer.summarize("article").await, "First answer.");
        assert_eq!(summarizer.strict.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_transport_error_keeps_first_answer() {
        let summarizer = Summarizer::new(
            ScriptedAsk::new().answer("First answer."),
            ScriptedAsk::new().fail("timeout"),
        );

        assert_eq!(summarizer.summarize("article").await, "First answer.");
    }

    #[tokio::test]
    async fn test_transport_failure_is_empty() {
        let summarizer = Summarizer::new(ScriptedAsk::new().fail("down"), ScriptedAsk::new());

        assert_eq!(summarizer.summarize("article").await, "");
        assert_eq!(summarizer.strict.calls(), 0);
    }
}
