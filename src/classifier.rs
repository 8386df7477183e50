//! Headline relevance scoring.
//!
//! All sampled titles go to the model in one request, serialized as a JSON
//! array. The model is expected to answer with
//!
//! ```json
//! {"articles": [{"title": "Rust lands in the kernel", "relevance": 8}]}
//! ```
//!
//! and is not trusted to do so. Entries for titles that were not asked about,
//! and entries whose score is missing, non-numeric or outside `0..=10`, are
//! dropped. If the call fails or the body is not JSON at all, the result is
//! empty and the run simply classifies nothing.

use crate::api::AskAsync;
use crate::error::{PipelineError, Result};
use crate::utils::{looks_truncated, strip_code_fences, truncate_for_log};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// Scores headlines through a language model.
#[derive(Debug)]
pub struct RelevanceClassifier<A> {
    oracle: A,
}

impl<A> RelevanceClassifier<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(oracle: A) -> Self {
        Self { oracle }
    }

    #[cfg(test)]
    pub(crate) fn oracle(&self) -> &A {
        &self.oracle
    }

    /// Score `titles`, returning only the titles the model scored cleanly.
    #[instrument(level = "info", skip_all, fields(count = titles.len()))]
    pub async fn classify(&self, titles: &[String]) -> HashMap<String, f64> {
        if titles.is_empty() {
            return HashMap::new();
        }
        let request = match serde_json::to_string_pretty(titles) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not encode titles");
                return HashMap::new();
            }
        };

        let body = match self.oracle.ask(&request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Relevance request failed; nothing classified this run");
                return HashMap::new();
            }
        };

        match parse_scores(&body, titles) {
            Ok(scores) => {
                info!(requested = titles.len(), scored = scores.len(), "Classified headlines");
                scores
            }
            Err(e) => {
                warn!(
                    error = %e,
                    response_preview = %truncate_for_log(&body, 300),
                    "Relevance response unusable; nothing classified this run"
                );
                HashMap::new()
            }
        }
    }
}

/// Parse a relevance response, keeping only well-formed entries for known
/// titles. The first entry for a title wins.
pub fn parse_scores(body: &str, titles: &[String]) -> Result<HashMap<String, f64>> {
    let value: Value = serde_json::from_str(strip_code_fences(body)).map_err(|e| {
        let reason = if looks_truncated(&e) { "truncated JSON" } else { "invalid JSON" };
        PipelineError::MalformedResponse(format!("{reason}: {e}"))
    })?;
    let entries = value
        .get("articles")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::MalformedResponse("missing \"articles\" array".into()))?;

    let known: HashSet<&str> = titles.iter().map(String::as_str).collect();
    let mut scores = HashMap::new();
    for entry in entries {
        let Some(title) = entry.get("title").and_then(Value::as_str) else {
            debug!(?entry, "Dropping entry without title");
            continue;
        };
        if !known.contains(title) {
            debug!(title, "Dropping score for unknown title");
            continue;
        }
        let Some(score) = entry.get("relevance").and_then(score_value) else {
            debug!(title, "Dropping entry with unusable score");
            continue;
        };
        scores.entry(title.to_string()).or_insert(score);
    }
    Ok(scores)
}

/// A relevance value as a number in range. Numeric strings are accepted.
fn score_value(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)).then_some(score)
}
