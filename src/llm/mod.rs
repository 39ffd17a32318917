//! Language-model capabilities used by the pipeline.
//!
//! This module defines the two model-backed operations the pipeline needs:
//! proposing related search terms for a query, and scoring one paper against
//! a query. Both are traits so the pipeline never depends on a concrete
//! model client; `openai` provides the production implementation.

pub mod openai;
pub mod parse;
pub mod prompts;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Ranking;

/// Errors that can occur when calling a language model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network or API communication error
    #[error("API request failed: {0}")]
    ApiError(String),

    /// The API rejected the request because of rate limiting
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The model answered, but not in the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error (e.g., missing API key)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for language-model operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Capability: expand a research query into related search terms.
#[async_trait]
pub trait TermProposer: Send + Sync {
    /// Propose related search terms for `query`.
    ///
    /// Implementations should return the terms in the order the model gave
    /// them. An empty or unparseable answer must be reported as
    /// `LlmError::MalformedResponse` rather than an empty list.
    async fn propose_terms(&self, query: &str) -> LlmResult<Vec<String>>;
}

/// Capability: judge how relevant a paper is to a query.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score a single paper against `query`.
    ///
    /// # Returns
    /// A ranking whose `relevance_score` is within `1..=10`
    ///
    /// # Errors
    /// A response that cannot be parsed, or whose score falls outside the
    /// allowed range, is `LlmError::MalformedResponse`. It is never turned
    /// into a low score.
    async fn score(&self, query: &str, title: &str, abstract_text: &str) -> LlmResult<Ranking>;
}
