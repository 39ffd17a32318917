//! Candidate aggregation stage.
//!
//! Fetches papers for every search term from a `PaperProvider` and merges them
//! into one candidate list. Titles are the identity key: the first paper seen
//! with a given (normalized) title wins and later copies are dropped.
//!
//! # Title normalization
//!
//! Titles are compared after lower-casing, trimming and collapsing inner
//! whitespace, so `"Attention Is All You Need"` and
//! `"attention is  all you need "` are the same candidate. Punctuation is
//! left alone, so `"BERT: Pre-training"` and `"BERT Pre-training"` are not.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Paper;
use crate::provider::PaperProvider;

/// Errors that end aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Every term was tried and none produced a candidate
    #[error("no papers found for {terms_tried} search term(s) ({terms_failed} failed)")]
    NoCandidates {
        /// Number of terms searched
        terms_tried: usize,

        /// Number of terms whose fetch failed
        terms_failed: usize,
    },
}

/// Result type for aggregation.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// Progress notifications emitted while aggregating.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateProgress {
    /// About to fetch papers for a term (`index` is 1-based)
    TermStarted {
        index: usize,
        total: usize,
        term: String,
    },

    /// The fetch for a term failed and the term was skipped
    TermFailed { term: String, reason: String },
}

/// Statistics from an aggregation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregationStats {
    /// Terms whose fetch was attempted
    pub terms_searched: usize,

    /// Terms whose fetch failed
    pub terms_failed: usize,

    /// Papers returned by the provider across all terms
    pub papers_fetched: usize,

    /// Papers dropped because their title was already seen
    pub duplicates_skipped: usize,

    /// Unique candidates kept
    pub unique_candidates: usize,
}

/// Deduplicated candidates in first-seen order, with run statistics.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub candidates: Vec<Paper>,
    pub stats: AggregationStats,
}

/// Normalize a title into its deduplication key.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Gathers candidate papers for a list of terms.
#[derive(Clone)]
pub struct CandidateAggregator {
    provider: Arc<dyn PaperProvider>,
}

impl CandidateAggregator {
    /// Create a new aggregator backed by `provider`.
    pub fn new(provider: Arc<dyn PaperProvider>) -> Self {
        Self { provider }
    }

    /// Fetch and deduplicate candidates for `terms`.
    ///
    /// Terms are searched sequentially, in order, with up to
    /// `per_term_limit` papers each. A failed fetch is reported through
    /// `on_progress` and skipped.
    ///
    /// # Errors
    /// Returns `AggregateError::NoCandidates` if no term yielded a paper
    pub async fn aggregate<F>(
        &self,
        terms: &[String],
        per_term_limit: usize,
        mut on_progress: F,
    ) -> AggregateResult<Aggregation>
    where
        F: FnMut(AggregateProgress) + Send,
    {
        let total = terms.len();
        let mut stats = AggregationStats::default();
        let mut seen_titles: HashSet<String> = HashSet::new();
        let mut candidates: Vec<Paper> = Vec::new();

        for (i, term) in terms.iter().enumerate() {
            on_progress(AggregateProgress::TermStarted {
                index: i + 1,
                total,
                term: term.clone(),
            });
            stats.terms_searched += 1;

            let papers = match self.provider.fetch(term, per_term_limit).await {
                Ok(papers) => papers,
                Err(e) => {
                    warn!(term = %term, provider = self.provider.name(), error = %e, "fetch failed; skipping term");
                    stats.terms_failed += 1;
                    on_progress(AggregateProgress::TermFailed {
                        term: term.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            debug!(term = %term, count = papers.len(), "papers fetched");
            stats.papers_fetched += papers.len();

            for paper in papers {
                if seen_titles.insert(normalize_title(&paper.title)) {
                    candidates.push(paper);
                } else {
                    stats.duplicates_skipped += 1;
                }
            }
        }

        stats.unique_candidates = candidates.len();

        if candidates.is_empty() {
            return Err(AggregateError::NoCandidates {
                terms_tried: stats.terms_searched,
                terms_failed: stats.terms_failed,
            });
        }

        info!(
            unique = stats.unique_candidates,
            duplicates = stats.duplicates_skipped,
            failed_terms = stats.terms_failed,
            "candidates aggregated"
        );

        Ok(Aggregation { candidates, stats })
    }
}
