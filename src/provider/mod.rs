//! Paper provider module.
//!
//! This module defines the interface for fetching candidate papers from an
//! academic search index and includes the arXiv implementation.
//!
//! The `PaperProvider` trait abstracts the index so the aggregation stage can
//! be driven by arXiv in production and by in-memory fixtures in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Paper;

pub mod arxiv;

/// Errors that can occur when fetching papers from a provider.
///
/// A search that matches nothing is not an error; providers return an empty
/// vector for that case.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// API rate limit exceeded or service temporarily unavailable
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Failed to parse the response format
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The index rejected the query
    #[error("Query rejected: {0}")]
    QueryRejected(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for fetching candidate papers for a search term.
///
/// # Design Notes
///
/// - Results are ordered by the index's own relevance notion
/// - Providers do not deduplicate; the aggregation stage does
/// - Timeouts surface as ordinary errors for the single call
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch up to `limit` papers matching `term`.
    ///
    /// # Returns
    /// Papers in index relevance order (may be fewer than `limit`, or empty)
    ///
    /// # Errors
    /// Returns `ProviderError` if the index could not be queried
    async fn fetch(&self, term: &str, limit: usize) -> ProviderResult<Vec<Paper>>;

    /// Get a human-readable name of this provider.
    ///
    /// This is useful for logging and debugging.
    fn name(&self) -> &str;
}
