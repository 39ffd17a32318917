//! LLM Paper Search - LLM-assisted literature search over arXiv.
//!
//! This library takes a free-text research query, widens it into related
//! search terms with a chat model, gathers candidate papers from arXiv for
//! every term, and has the chat model score each candidate's relevance to the
//! original query.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **models**: Core data structures (Paper, Ranking, ScoredPaper, etc.)
//! - **llm**: Chat model capabilities (term proposal, relevance scoring)
//! - **provider**: Paper sources (arXiv Atom API)
//! - **expansion**: Query → search terms, with fallback to the bare query
//! - **aggregate**: Per-term fetching and title deduplication
//! - **rerank**: Relevance scoring, ordering and top-N selection
//! - **pipeline**: Background job runner and event channel
//! - **config**: Environment-based configuration
//!
//! # Workflow
//!
//! 1. Expand the query into search terms (the query itself is always kept)
//! 2. Fetch up to N papers per term, skipping terms whose fetch fails
//! 3. Drop papers whose normalized title was already seen
//! 4. Score every remaining paper 1-10 against the original query
//! 5. Sort by score (ties keep discovery order) and show the top results
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use llm_paper_search::{
//!     config::AppConfig,
//!     llm::openai::OpenAIChat,
//!     pipeline::{PipelineEvent, PipelineRequest, PipelineRunner},
//!     provider::arxiv::ArxivProvider,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let chat = Arc::new(OpenAIChat::new(config.chat)?);
//!     let arxiv = Arc::new(ArxivProvider::new(config.arxiv)?);
//!     let runner = PipelineRunner::new(chat.clone(), arxiv, chat);
//!
//!     let handle = runner.spawn(PipelineRequest::new("diffusion models for audio"))?;
//!     if let PipelineEvent::Results(outcome) = handle.wait().await {
//!         for result in outcome.top() {
//!             println!("{}: {}", result.paper.title, result.relevance_score);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Public modules
pub mod aggregate;
pub mod config;
pub mod expansion;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod rerank;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use models::{Paper, Ranking, RelevanceLevel, ScoredPaper};
pub use llm::{RelevanceScorer, TermProposer};
pub use provider::PaperProvider;
pub use pipeline::{PipelineEvent, PipelineRequest, PipelineRunner, PipelineSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of papers fetched per search term
pub const DEFAULT_MAX_RESULTS_PER_TERM: usize = 5;

/// Default number of results shown
pub const DEFAULT_TOP_N: usize = 5;
