//! Core data models for the paper search pipeline.
//!
//! This module contains the fundamental data structures passed between the
//! pipeline stages: candidate papers as returned by an index, the ranking an
//! LLM assigns to a paper, and the scored paper that combines the two.

use serde::{Deserialize, Serialize};

/// Relevance score assigned when a paper could not be scored.
pub const FAILED_SCORE: u8 = 0;

/// Justification attached to a paper that could not be scored.
pub const FAILED_JUSTIFICATION: &str = "Failed to analyze.";

/// Highest score the scoring model may assign.
pub const MAX_SCORE: u8 = 10;

/// Lowest score the scoring model may assign to a successfully analyzed paper.
pub const MIN_SCORE: u8 = 1;

/// A candidate paper as returned by an index provider.
///
/// The title is the identity key used for deduplication. Everything else is
/// carried through the pipeline untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Paper title
    pub title: String,

    /// Author names, in the order the index lists them
    pub authors: Vec<String>,

    /// Abstract text
    pub abstract_text: String,

    /// Retrievable link to the full text (PDF when available)
    pub link: String,

    /// Index-specific identifier (e.g. the arXiv abs URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Year of first publication, when the index reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_year: Option<i32>,

    /// Primary subject category, when the index reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
}

impl Paper {
    /// Create a paper with only the fields every index provides.
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        abstract_text: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            authors,
            abstract_text: abstract_text.into(),
            link: link.into(),
            source_id: None,
            publish_year: None,
            primary_category: None,
        }
    }
}

/// The structured judgement returned by the scoring model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ranking {
    /// Score from 1 (not relevant) to 10 (highly relevant)
    pub relevance_score: u8,

    /// One-sentence justification for the score
    pub justification: String,
}

impl Ranking {
    /// Whether the score is within `MIN_SCORE..=MAX_SCORE` and the
    /// justification is not blank.
    pub fn is_valid(&self) -> bool {
        (MIN_SCORE..=MAX_SCORE).contains(&self.relevance_score)
            && !self.justification.trim().is_empty()
    }
}

/// Display band for a relevance score.
///
/// Bands are only used to colour output; ordering always uses the raw score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelevanceLevel {
    /// Score 8-10
    High,

    /// Score 5-7
    Medium,

    /// Score 1-4
    Low,

    /// Scoring failed (sentinel score 0)
    Unscored,
}

impl RelevanceLevel {
    /// Determine the display band for a relevance score.
    pub fn from_score(score: u8) -> Self {
        match score {
            8.. => RelevanceLevel::High,
            5..=7 => RelevanceLevel::Medium,
            1..=4 => RelevanceLevel::Low,
            0 => RelevanceLevel::Unscored,
        }
    }
}

/// A candidate paper augmented with its relevance judgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPaper {
    /// The candidate paper
    pub paper: Paper,

    /// Relevance score in `0..=10`; `0` marks a scoring failure
    pub relevance_score: u8,

    /// Justification for the score
    pub justification: String,
}

impl ScoredPaper {
    /// Attach a successful ranking to a paper.
    ///
    /// The ranking is stored as given; callers check `Ranking::is_valid`.
    pub fn new(paper: Paper, ranking: Ranking) -> Self {
        Self {
            paper,
            relevance_score: ranking.relevance_score,
            justification: ranking.justification,
        }
    }

    /// Mark a paper as unscored after a scoring failure.
    pub fn failed(paper: Paper) -> Self {
        Self {
            paper,
            relevance_score: FAILED_SCORE,
            justification: FAILED_JUSTIFICATION.to_string(),
        }
    }

    /// Whether this paper carries the failure sentinel.
    pub fn is_failed(&self) -> bool {
        self.relevance_score == FAILED_SCORE && self.justification == FAILED_JUSTIFICATION
    }

    /// Display band for this paper's score.
    pub fn relevance(&self) -> RelevanceLevel {
        RelevanceLevel::from_score(self.relevance_score)
    }
}
