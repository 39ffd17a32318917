//! Top-N selection over a ranked result list.

use crate::models::ScoredPaper;

/// Return the first `top_n` entries of an already sorted result list.
///
/// The returned slice has length `min(top_n, results.len())`.
pub fn select_top(results: &[ScoredPaper], top_n: usize) -> &[ScoredPaper] {
    &results[..top_n.min(results.len())]
}
