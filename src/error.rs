//! Error taxonomy for the article pipeline.
//!
//! Only [`PipelineError::Store`] raised while opening the database is fatal to
//! a run. Every other variant is logged by the caller and turned into an empty
//! or null result for the item being processed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network failure, timeout or non-2xx response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The oracle answered with something that could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A record lacking a title or a usable URL.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
