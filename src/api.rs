//! Language model access with exponential backoff retry logic.
//!
//! Both the relevance classifier and the summarizer talk to an
//! OpenAI-compatible endpoint through `awful_aj`. The instruction text lives
//! in an `awful_aj` chat template; this module only moves strings.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait defining async model interaction
//! - [`AskFnWrapper`]: wraps `awful_aj::api::ask` for one template
//! - [`RetryAsk`]: decorator that retries transport failures with backoff
//!
//! # Retry Strategy
//!
//! - Bounded number of retries (configurable, 2 by default)
//! - Exponential backoff starting at `base_delay`, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Trait for async model interaction.
///
/// Implementors send text to a model and return its answer. The classifier
/// and summarizer are generic over it, so tests can substitute canned answers.
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    /// Send text to the model and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay(retry) = min(base_delay * 2^(retry-1), max_delay) + jitter(0..=250ms)
/// ```
pub struct RetryAsk<T> {
    inner: T,
    /// Retries after the first attempt before giving up.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    /// Delay before retry number `retry` (1-based), without jitter.
    fn backoff(&self, retry: usize) -> StdDuration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all, fields(max_retries = self.max_retries))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let started = Instant::now();
        let mut retry = 0;
        loop {
            let err = match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            if retry == self.max_retries {
                error!(
                    attempts = retry + 1,
                    elapsed = ?started.elapsed(),
                    error = %err,
                    "Model call failed; giving up"
                );
                return Err(err);
            }
            retry += 1;
            let delay = self.backoff(retry) + StdDuration::from_millis(rng().random_range(0..=250));
            warn!(retry, ?delay, error = %err, "Model call failed; retrying");
            sleep(delay).await;
        }
    }
}

/// Adapts `awful_aj::api::ask` to [`AskAsync`] for a single chat template.
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// API endpoint, key and model settings.
    pub config: &'a AwfulJadeConfig,
    /// System prompt and message scaffolding for this kind of request.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// An [`AskFnWrapper`] behind the retry decorator.
pub type Oracle<'a> = RetryAsk<AskFnWrapper<'a>>;

pub fn oracle<'a>(
    config: &'a AwfulJadeConfig,
    template: &'a ChatTemplate,
    max_retries: usize,
) -> Oracle<'a> {
    RetryAsk::new(
        AskFnWrapper { config, template },
        max_retries,
        StdDuration::from_secs(1),
    )
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedAsk;
    use super::*;

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let inner = ScriptedAsk::new().fail("timeout").fail("502").answer("ok");
        let api = RetryAsk::new(inner, 2, StdDuration::ZERO);

        assert_eq!(api.ask("hello").await.unwrap(), "ok");
        assert_eq!(api.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let inner = ScriptedAsk::new().fail("a").fail("b").answer("too late");
        let api = RetryAsk::new(inner, 1, StdDuration::ZERO);

        assert!(api.ask("hello").await.is_err());
        assert_eq!(api.inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let inner = ScriptedAsk::new().fail("down");
        let api = RetryAsk::new(inner, 0, StdDuration::ZERO);

        assert!(api.ask("hello").await.is_err());
        assert_eq!(api.inner.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let api = RetryAsk::new(ScriptedAsk::new(), 10, StdDuration::from_secs(1));

        assert_eq!(api.backoff(1), StdDuration::from_secs(1));
        assert_eq!(api.backoff(2), StdDuration::from_secs(2));
        assert_eq!(api.backoff(4), StdDuration::from_secs(8));
        assert_eq!(api.backoff(10), StdDuration::from_secs(30));
    }
}
