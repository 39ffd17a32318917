//! Relevance reranking stage.
//!
//! Scores every candidate against the original query with a
//! `RelevanceScorer` and orders the candidates by that score.
//!
//! A scoring failure never drops a candidate: the paper is kept with score
//! `0` and the justification `"Failed to analyze."`, which sorts it below
//! every successfully scored paper.

pub mod select;

pub use select::select_top;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::llm::RelevanceScorer;
use crate::models::{Paper, ScoredPaper};

/// Statistics from a rerank run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RerankStats {
    /// Candidates scored successfully
    pub scored: usize,

    /// Candidates that fell back to the failure sentinel
    pub failed: usize,
}

/// Scored candidates sorted by descending relevance, with run statistics.
#[derive(Debug, Clone)]
pub struct Reranked {
    pub results: Vec<ScoredPaper>,
    pub stats: RerankStats,
}

/// Scores and orders candidates.
#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    /// Create a new reranker backed by `scorer`.
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Score `candidates` against `query` and sort them.
    ///
    /// Candidates are scored one at a time, in input order. `on_scored` is
    /// called after each candidate with the 1-based position and the total.
    /// The output has exactly as many entries as the input and is sorted by
    /// descending score; ties keep their input order.
    pub async fn rerank<F>(&self, candidates: Vec<Paper>, query: &str, mut on_scored: F) -> Reranked
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = candidates.len();
        let mut stats = RerankStats::default();
        let mut results: Vec<ScoredPaper> = Vec::with_capacity(total);

        for (i, paper) in candidates.into_iter().enumerate() {
            let scored = match self
                .scorer
                .score(query, &paper.title, &paper.abstract_text)
                .await
            {
                Ok(ranking) if ranking.is_valid() => {
                    debug!(title = %paper.title, score = ranking.relevance_score, "paper scored");
                    stats.scored += 1;
                    ScoredPaper::new(paper, ranking)
                }
                Ok(ranking) => {
                    warn!(
                        title = %paper.title,
                        score = ranking.relevance_score,
                        justification = %ranking.justification,
                        "scorer returned an out-of-range ranking"
                    );
                    stats.failed += 1;
                    ScoredPaper::failed(paper)
                }
                Err(e) => {
                    warn!(title = %paper.title, error = %e, "could not rank paper");
                    stats.failed += 1;
                    ScoredPaper::failed(paper)
                }
            };
            results.push(scored);
            on_scored(i + 1, total);
        }

        sort_by_relevance(&mut results);

        info!(scored = stats.scored, failed = stats.failed, "candidates reranked");

        Reranked { results, stats }
    }
}

/// Stable sort by descending relevance score.
pub fn sort_by_relevance(results: &mut [ScoredPaper]) {
    results.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
}
