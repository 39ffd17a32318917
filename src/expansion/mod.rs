//! Query expansion stage.
//!
//! Turns a single research query into a list of related search terms using a
//! `TermProposer`. Expansion is best effort: whatever happens, the caller gets
//! a non-empty list that contains the original query.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::{LlmError, TermProposer};

/// Expands a query into related search terms.
#[derive(Clone)]
pub struct TermExpander {
    proposer: Arc<dyn TermProposer>,
}

impl TermExpander {
    /// Create a new expander backed by `proposer`.
    pub fn new(proposer: Arc<dyn TermProposer>) -> Self {
        Self { proposer }
    }

    /// Expand `query` into an ordered list of search terms.
    ///
    /// The original query is prepended when the model did not echo it back.
    /// Any failure (network, malformed answer, blank terms only) is logged
    /// and the single-element list `[query]` is returned instead. No retry
    /// is attempted.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        match self.try_expand(query).await {
            Ok(terms) => {
                info!(query, count = terms.len(), "query expanded");
                terms
            }
            Err(e) => {
                warn!(query, error = %e, "query expansion failed; searching with the original query only");
                vec![query.to_string()]
            }
        }
    }

    async fn try_expand(&self, query: &str) -> Result<Vec<String>, LlmError> {
        let mut terms: Vec<String> = self
            .proposer
            .propose_terms(query)
            .await?
            .into_iter()
            .map(|term| term.trim().to_string())
            .filter(|term| !term.is_empty())
            .collect();

        if terms.is_empty() {
            return Err(LlmError::MalformedResponse(
                "model proposed no usable terms".to_string(),
            ));
        }

        if !terms.iter().any(|term| term == query) {
            terms.insert(0, query.to_string());
        }

        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Mock term proposer returning a canned answer and recording calls.
    struct MockProposer {
        answer: Mutex<Option<LlmResult<Vec<String>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockProposer {
        fn returning(terms: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(Ok(terms.iter().map(|t| t.to_string()).collect()))),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(error: LlmError) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(Err(error))),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TermProposer for MockProposer {
        async fn propose_terms(&self, query: &str) -> LlmResult<Vec<String>> {
            self.calls.lock().unwrap().push(query.to_string());
            self.answer
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(LlmError::ApiError("answer already consumed".to_string())))
        }
    }

    #[tokio::test]
    async fn test_prepends_missing_query() {
        let proposer = MockProposer::returning(&["message passing", "graph attention"]);
        let expander = TermExpander::new(proposer.clone());

        let terms = expander.expand("graph neural networks").await;

        assert_eq!(
            terms,
            vec!["graph neural networks", "message passing", "graph attention"]
        );
        assert_eq!(proposer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_keeps_query_position_when_present() {
        let proposer = MockProposer::returning(&["message passing", "gnn", "graph attention"]);
        let expander = TermExpander::new(proposer);

        let terms = expander.expand("gnn").await;

        assert_eq!(terms, vec!["message passing", "gnn", "graph attention"]);
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let proposer = MockProposer::failing(LlmError::ApiError("timeout".to_string()));
        let expander = TermExpander::new(proposer.clone());

        let terms = expander.expand("graph neural networks").await;

        assert_eq!(terms, vec!["graph neural networks"]);
        assert_eq!(proposer.call_count(), 1, "no retry on failure");
    }

    #[tokio::test]
    async fn test_fallback_on_malformed() {
        let proposer = MockProposer::failing(LlmError::MalformedResponse("garbage".to_string()));
        let terms = TermExpander::new(proposer).expand("q").await;
        assert_eq!(terms, vec!["q"]);
    }

    #[tokio::test]
    async fn test_blank_terms_dropped() {
        let proposer = MockProposer::returning(&["  ", "vision transformers ", ""]);
        let terms = TermExpander::new(proposer).expand("ViT").await;
        assert_eq!(terms, vec!["ViT", "vision transformers"]);
    }

    #[tokio::test]
    async fn test_all_blank_is_fallback() {
        let proposer = MockProposer::returning(&[" ", ""]);
        let terms = TermExpander::new(proposer).expand("ViT").await;
        assert_eq!(terms, vec!["ViT"]);
    }
}
