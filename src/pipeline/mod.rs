//! Background pipeline execution.
//!
//! `PipelineRunner` composes expansion, aggregation and reranking into one job
//! that runs on a tokio task. The caller gets a `PipelineHandle` wrapping the
//! receiving end of an ordered channel and can poll it from a UI loop without
//! ever waiting on the network.
//!
//! Every job emits zero or more `PipelineEvent::Status` events followed by
//! exactly one terminal event (`Terms`, `Results` or `Error`). The channel
//! closes after the terminal event.
//!
//! ```rust,no_run
//! use llm_paper_search::pipeline::{PipelineEvent, PipelineRequest, PipelineRunner};
//! # async fn example(runner: PipelineRunner) -> Result<(), Box<dyn std::error::Error>> {
//! let mut handle = runner.spawn(PipelineRequest::new("graph neural networks"))?;
//! while let Some(event) = handle.next().await {
//!     match event {
//!         PipelineEvent::Status(msg) => eprintln!("{}", msg),
//!         PipelineEvent::Results(outcome) => {
//!             for paper in outcome.top() {
//!                 println!("{} ({}/10)", paper.paper.title, paper.relevance_score);
//!             }
//!         }
//!         PipelineEvent::Error(msg) => eprintln!("error: {}", msg),
//!         PipelineEvent::Terms(_) => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod session;

pub use session::PipelineSession;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::aggregate::{AggregateError, AggregateProgress, AggregationStats, CandidateAggregator};
use crate::expansion::TermExpander;
use crate::llm::{RelevanceScorer, TermProposer};
use crate::models::ScoredPaper;
use crate::provider::PaperProvider;
use crate::rerank::{select_top, RerankStats, Reranker};
use crate::{DEFAULT_MAX_RESULTS_PER_TERM, DEFAULT_TOP_N};

/// Errors that prevent a job from starting or end it early.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request was rejected before a job started
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A job is already running in this session
    #[error("A search is already running; wait for it to finish")]
    RunInProgress,

    /// Aggregation produced no candidates
    #[error("{0}. Please try a different query.")]
    NoCandidates(#[from] AggregateError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Parameters for one search run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    /// The user's query, used for expansion and for scoring
    pub query: String,

    /// Pre-selected search terms; when set, expansion is skipped
    pub terms: Option<Vec<String>>,

    /// Papers to fetch per term
    pub max_results_per_term: usize,

    /// Number of results the caller wants to display
    pub top_n: usize,
}

impl PipelineRequest {
    /// Create a request with default limits. The query is trimmed.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into().trim().to_string(),
            terms: None,
            max_results_per_term: DEFAULT_MAX_RESULTS_PER_TERM,
            top_n: DEFAULT_TOP_N,
        }
    }

    /// Search with these terms instead of expanding the query.
    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn with_max_results_per_term(mut self, max_results_per_term: usize) -> Self {
        self.max_results_per_term = max_results_per_term;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Reject caller-input errors before any work starts.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidRequest` for a blank query, an explicit
    /// term selection with no non-blank term, or a zero limit
    pub fn validate(&self) -> PipelineResult<()> {
        if self.query.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        if let Some(terms) = &self.terms {
            if terms.iter().all(|t| t.trim().is_empty()) {
                return Err(PipelineError::InvalidRequest(
                    "select at least one search term".to_string(),
                ));
            }
        }
        if self.max_results_per_term == 0 {
            return Err(PipelineError::InvalidRequest(
                "max results per term must be at least 1".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(PipelineError::InvalidRequest(
                "top N must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The query the papers were scored against
    pub query: String,

    /// The terms that were searched
    pub terms: Vec<String>,

    /// All scored candidates, sorted by descending relevance
    pub results: Vec<ScoredPaper>,

    /// Number of results the caller asked to display
    pub top_n: usize,

    pub aggregation: AggregationStats,
    pub rerank: RerankStats,
}

impl PipelineOutcome {
    /// The top `top_n` results.
    pub fn top(&self) -> &[ScoredPaper] {
        select_top(&self.results, self.top_n)
    }
}

/// Messages sent from a running job to its caller.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Human-readable progress message
    Status(String),

    /// Terminal event of an expansion job: the expanded terms
    Terms(Vec<String>),

    /// Terminal event of a search job
    Results(PipelineOutcome),

    /// Terminal event of a failed job
    Error(String),
}

impl PipelineEvent {
    /// Whether this event ends its job.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Status(_))
    }
}

/// Sending half of a job's event channel.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventSink {
    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(status = %message, "pipeline status");
        // The caller may have dropped its handle; the job still runs to completion.
        let _ = self.tx.send(PipelineEvent::Status(message));
    }

    fn terminal(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Receiving half of a job's event channel.
pub struct PipelineHandle {
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    worker: JoinHandle<()>,
    finished: bool,
}

impl PipelineHandle {
    /// Take the next pending event without waiting.
    ///
    /// Returns `None` when no event is queued yet or the job has ended.
    pub fn try_next(&mut self) -> Option<PipelineEvent> {
        let event = self.events.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Wait for the next event. Returns `None` once the channel is closed.
    pub async fn next(&mut self) -> Option<PipelineEvent> {
        let event = self.events.recv().await?;
        self.observe(&event);
        Some(event)
    }

    /// Wait for the terminal event, discarding status events.
    pub async fn wait(mut self) -> PipelineEvent {
        while let Some(event) = self.next().await {
            if event.is_terminal() {
                return event;
            }
        }
        PipelineEvent::Error("pipeline worker exited without a result".to_string())
    }

    /// Whether the terminal event has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    fn observe(&mut self, event: &PipelineEvent) {
        if event.is_terminal() {
            self.finished = true;
        }
    }
}

/// Runs the expand → aggregate → rerank pipeline on background tasks.
///
/// Cloning is cheap; all collaborators are shared behind `Arc`.
#[derive(Clone)]
pub struct PipelineRunner {
    expander: TermExpander,
    aggregator: CandidateAggregator,
    reranker: Reranker,
}

impl PipelineRunner {
    /// Create a runner from the three capabilities.
    pub fn new(
        proposer: Arc<dyn TermProposer>,
        provider: Arc<dyn PaperProvider>,
        scorer: Arc<dyn RelevanceScorer>,
    ) -> Self {
        Self::from_stages(
            TermExpander::new(proposer),
            CandidateAggregator::new(provider),
            Reranker::new(scorer),
        )
    }

    /// Create a runner from already constructed stages.
    pub fn from_stages(
        expander: TermExpander,
        aggregator: CandidateAggregator,
        reranker: Reranker,
    ) -> Self {
        Self {
            expander,
            aggregator,
            reranker,
        }
    }

    /// Start a search job.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidRequest` if the request fails
    /// validation; no job is started in that case
    pub fn spawn(&self, request: PipelineRequest) -> PipelineResult<PipelineHandle> {
        request.validate()?;
        let runner = self.clone();
        Ok(spawn_job(move |sink| async move {
            runner
                .execute(request, &sink)
                .await
                .map(PipelineEvent::Results)
        }))
    }

    /// Start an expansion-only job that ends with `PipelineEvent::Terms`.
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidRequest` for a blank query
    pub fn spawn_expansion(&self, query: &str) -> PipelineResult<PipelineHandle> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }
        let expander = self.expander.clone();
        Ok(spawn_job(move |sink| async move {
            sink.status("Expanding query with LLM...");
            Ok(PipelineEvent::Terms(expander.expand(&query).await))
        }))
    }

    /// Run all stages, reporting progress through `sink`.
    async fn execute(
        &self,
        request: PipelineRequest,
        sink: &EventSink,
    ) -> PipelineResult<PipelineOutcome> {
        let PipelineRequest {
            query,
            terms,
            max_results_per_term,
            top_n,
        } = request;

        let terms = match terms {
            Some(selected) => selected
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            None => {
                sink.status("Expanding query with LLM...");
                self.expander.expand(&query).await
            }
        };

        info!(query = %query, terms = terms.len(), "starting search");
        sink.status(format!("Gathering papers for {} terms...", terms.len()));

        let aggregation = self
            .aggregator
            .aggregate(&terms, max_results_per_term, |progress| match progress {
                AggregateProgress::TermStarted { index, total, term } => {
                    sink.status(format!("Searching for '{}' ({}/{})...", term, index, total));
                }
                AggregateProgress::TermFailed { term, reason } => {
                    sink.status(format!("Search for '{}' failed, skipping: {}", term, reason));
                }
            })
            .await?;

        let candidate_count = aggregation.candidates.len();
        sink.status(format!("Re-ranking {} papers with LLM...", candidate_count));

        let reranked = self
            .reranker
            .rerank(aggregation.candidates, &query, |k, total| {
                sink.status(format!("Scored {}/{} papers", k, total));
            })
            .await;

        Ok(PipelineOutcome {
            query,
            terms,
            results: reranked.results,
            top_n,
            aggregation: aggregation.stats,
            rerank: reranked.stats,
        })
    }
}

/// Run `job` on a background task and deliver its status and terminal
/// events through a fresh channel.
///
/// The job runs inside a nested task so a panic is caught at the join point
/// and still produces exactly one terminal `Error` event.
fn spawn_job<F, Fut>(job: F) -> PipelineHandle
where
    F: FnOnce(EventSink) -> Fut + Send + 'static,
    Fut: Future<Output = PipelineResult<PipelineEvent>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = EventSink { tx };

    let worker = tokio::spawn(async move {
        let work = tokio::spawn(job(sink.clone()));
        let terminal = match work.await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                info!(error = %e, "pipeline ended without results");
                PipelineEvent::Error(e.to_string())
            }
            Err(e) => {
                error!(error = %e, "pipeline worker failed");
                PipelineEvent::Error(format!("An unexpected error occurred: {}", e))
            }
        };
        sink.terminal(terminal);
    });

    PipelineHandle {
        events: rx,
        worker,
        finished: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmResult};
    use crate::models::{Paper, Ranking};
    use crate::provider::{ProviderError, ProviderResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ===== Mock Implementations =====

    struct MockProposer {
        terms: Option<Vec<String>>,
    }

    #[async_trait]
    impl TermProposer for MockProposer {
        async fn propose_terms(&self, _query: &str) -> LlmResult<Vec<String>> {
            self.terms
                .clone()
                .ok_or_else(|| LlmError::ApiError("mock expansion failure".to_string()))
        }
    }

    #[derive(Default)]
    struct MockProvider {
        papers: HashMap<String, Vec<Paper>>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaperProvider for MockProvider {
        async fn fetch(&self, term: &str, limit: usize) -> ProviderResult<Vec<Paper>> {
            self.calls.lock().unwrap().push(term.to_string());
            if self.failing.iter().any(|t| t == term) {
                return Err(ProviderError::NetworkError("mock network failure".to_string()));
            }
            Ok(self
                .papers
                .get(term)
                .map(|p| p.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct MockScorer {
        scores: HashMap<String, u8>,
        panic_on: Option<String>,
    }

    #[async_trait]
    impl RelevanceScorer for MockScorer {
        async fn score(&self, _query: &str, title: &str, _abstract_text: &str) -> LlmResult<Ranking> {
            if self.panic_on.as_deref() == Some(title) {
                panic!("scorer blew up on {}", title);
            }
            self.scores
                .get(title)
                .map(|&relevance_score| Ranking {
                    relevance_score,
                    justification: "mock".to_string(),
                })
                .ok_or_else(|| LlmError::MalformedResponse("mock".to_string()))
        }
    }

    fn paper(title: &str) -> Paper {
        Paper::new(title, vec!["Author".to_string()], "Abstract", format!("http://{}", title))
    }

    struct Fixture {
        proposer: MockProposer,
        provider: MockProvider,
        scorer: MockScorer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                proposer: MockProposer { terms: None },
                provider: MockProvider::default(),
                scorer: MockScorer {
                    scores: HashMap::new(),
                    panic_on: None,
                },
            }
        }

        fn expands_to(mut self, terms: &[&str]) -> Self {
            self.proposer.terms = Some(terms.iter().map(|t| t.to_string()).collect());
            self
        }

        fn papers(mut self, term: &str, titles: &[&str]) -> Self {
            self.provider
                .papers
                .insert(term.to_string(), titles.iter().map(|t| paper(t)).collect());
            self
        }

        fn failing_term(mut self, term: &str) -> Self {
            self.provider.failing.push(term.to_string());
            self
        }

        fn score(mut self, title: &str, score: u8) -> Self {
            self.scorer.scores.insert(title.to_string(), score);
            self
        }

        fn panic_on(mut self, title: &str) -> Self {
            self.scorer.panic_on = Some(title.to_string());
            self
        }

        fn build(self) -> (PipelineRunner, Arc<MockProvider>) {
            let provider = Arc::new(self.provider);
            let runner = PipelineRunner::new(
                Arc::new(self.proposer),
                provider.clone(),
                Arc::new(self.scorer),
            );
            (runner, provider)
        }
    }

    async fn collect(mut handle: PipelineHandle) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next().await {
            events.push(event);
        }
        events
    }

    fn assert_single_terminal_last(events: &[PipelineEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "exactly one terminal event: {:?}", events);
        assert!(events.last().unwrap().is_terminal(), "terminal event comes last");
    }

    fn statuses(events: &[PipelineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    // ===== Request Validation Tests =====

    #[test]
    fn test_request_defaults() {
        let request = PipelineRequest::new("  transformers  ");
        assert_eq!(request.query, "transformers");
        assert_eq!(request.max_results_per_term, 5);
        assert_eq!(request.top_n, 5);
        assert!(request.terms.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation_errors() {
        let invalid = [
            PipelineRequest::new("   "),
            PipelineRequest::new("q").with_terms(vec![]),
            PipelineRequest::new("q").with_terms(vec!["  ".to_string()]),
            PipelineRequest::new("q").with_top_n(0),
            PipelineRequest::new("q").with_max_results_per_term(0),
        ];
        for request in invalid {
            assert!(
                matches!(request.validate(), Err(PipelineError::InvalidRequest(_))),
                "should reject {:?}",
                request
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_request_never_starts() {
        let (runner, provider) = Fixture::new().build();
        assert!(runner.spawn(PipelineRequest::new("")).is_err());
        assert!(runner.spawn_expansion("  ").is_err());
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    // ===== Full Run Tests =====

    #[tokio::test]
    async fn test_successful_run_event_order() {
        let (runner, _) = Fixture::new()
            .expands_to(&["gnn", "message passing"])
            .papers("graph neural networks", &["A"])
            .papers("gnn", &["B", "A"])
            .papers("message passing", &["C"])
            .score("A", 4)
            .score("B", 9)
            .score("C", 6)
            .build();

        let handle = runner
            .spawn(PipelineRequest::new("graph neural networks").with_top_n(2))
            .unwrap();
        let events = collect(handle).await;

        assert_single_terminal_last(&events);
        let status = statuses(&events);
        assert_eq!(status[0], "Expanding query with LLM...");
        assert_eq!(status[1], "Gathering papers for 3 terms...");
        assert_eq!(status[2], "Searching for 'graph neural networks' (1/3)...");
        assert_eq!(status[3], "Searching for 'gnn' (2/3)...");
        assert_eq!(status[4], "Searching for 'message passing' (3/3)...");
        assert_eq!(status[5], "Re-ranking 3 papers with LLM...");

        match events.last().unwrap() {
            PipelineEvent::Results(outcome) => {
                let titles: Vec<_> = outcome.results.iter().map(|r| r.paper.title.as_str()).collect();
                assert_eq!(titles, vec!["B", "C", "A"]);
                assert_eq!(outcome.top_n, 2);
                assert_eq!(outcome.top().len(), 2);
                assert_eq!(outcome.aggregation.duplicates_skipped, 1);
                assert_eq!(outcome.terms[0], "graph neural networks");
            }
            other => panic!("Expected Results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expansion_failure_searches_original_query() {
        let (runner, provider) = Fixture::new()
            .papers("graph neural networks", &["A"])
            .score("A", 7)
            .build();

        let event = runner
            .spawn(PipelineRequest::new("graph neural networks"))
            .unwrap()
            .wait()
            .await;

        assert!(matches!(event, PipelineEvent::Results(_)));
        assert_eq!(
            *provider.calls.lock().unwrap(),
            vec!["graph neural networks".to_string()]
        );
    }

    #[tokio::test]
    async fn test_zero_candidates_is_error_event() {
        let (runner, _) = Fixture::new().expands_to(&["a", "b"]).build();

        let events = collect(runner.spawn(PipelineRequest::new("q")).unwrap()).await;

        assert_single_terminal_last(&events);
        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Results(_))));
        match events.last().unwrap() {
            PipelineEvent::Error(msg) => {
                assert!(msg.contains("No papers found") || msg.contains("no papers found"));
                assert!(msg.contains("3 search term(s)"));
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_term_reported_as_status() {
        let (runner, _) = Fixture::new()
            .failing_term("down")
            .papers("up", &["A"])
            .score("A", 5)
            .build();

        let request = PipelineRequest::new("q").with_terms(vec!["down".to_string(), "up".to_string()]);
        let events = collect(runner.spawn(request).unwrap()).await;

        assert!(statuses(&events)
            .iter()
            .any(|s| s.starts_with("Search for 'down' failed")));
        assert!(matches!(events.last(), Some(PipelineEvent::Results(_))));
    }

    #[tokio::test]
    async fn test_selected_terms_skip_expansion() {
        let (runner, provider) = Fixture::new()
            .expands_to(&["never used"])
            .papers("chosen", &["A"])
            .score("A", 5)
            .build();

        let request = PipelineRequest::new("q").with_terms(vec!["chosen".to_string(), " ".to_string()]);
        let events = collect(runner.spawn(request).unwrap()).await;

        assert!(!statuses(&events).iter().any(|s| s.contains("Expanding")));
        assert_eq!(*provider.calls.lock().unwrap(), vec!["chosen".to_string()]);
    }

    #[tokio::test]
    async fn test_scoring_failure_keeps_candidate() {
        let (runner, _) = Fixture::new()
            .papers("q", &["Good", "Bad", "Fine"])
            .score("Good", 8)
            .score("Fine", 3)
            .build();

        match runner.spawn(PipelineRequest::new("q")).unwrap().wait().await {
            PipelineEvent::Results(outcome) => {
                assert_eq!(outcome.results.len(), 3);
                assert!(outcome.results[2].is_failed());
                assert_eq!(outcome.rerank.failed, 1);
            }
            other => panic!("Expected Results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_error_event() {
        let (runner, _) = Fixture::new()
            .papers("q", &["Boom"])
            .panic_on("Boom")
            .build();

        let events = collect(runner.spawn(PipelineRequest::new("q")).unwrap()).await;

        assert_single_terminal_last(&events);
        match events.last().unwrap() {
            PipelineEvent::Error(msg) => assert!(msg.starts_with("An unexpected error occurred")),
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    // ===== Expansion Job Tests =====

    #[tokio::test]
    async fn test_expansion_job_ends_with_terms() {
        let (runner, provider) = Fixture::new().expands_to(&["x", "y"]).build();

        let events = collect(runner.spawn_expansion("q").unwrap()).await;

        assert_single_terminal_last(&events);
        match events.last().unwrap() {
            PipelineEvent::Terms(terms) => assert_eq!(terms, &vec!["q", "x", "y"]),
            other => panic!("Expected Terms, got {:?}", other),
        }
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    // ===== Handle Tests =====

    #[tokio::test]
    async fn test_handle_polling() {
        let (runner, _) = Fixture::new().papers("q", &["A"]).score("A", 5).build();
        let mut handle = runner.spawn(PipelineRequest::new("q")).unwrap();

        let mut polled = Vec::new();
        while !handle.is_finished() {
            match handle.try_next() {
                Some(event) => polled.push(event),
                None => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }

        assert_single_terminal_last(&polled);
        assert!(handle.try_next().is_none());
    }
}
