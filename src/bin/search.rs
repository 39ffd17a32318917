//! Search binary entry point.
//!
//! This binary provides a command-line interface for LLM-assisted paper search
//! over arXiv. It supports both single-query and interactive REPL modes, with
//! flexible output formatting (table or JSON).
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --query "graph neural networks"
//! ```
//!
//! JSON output with more candidates per term:
//! ```bash
//! search --query "diffusion models" --max-results-per-term 10 --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --interactive
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use llm_paper_search::{
    config::AppConfig,
    llm::openai::OpenAIChat,
    models::{RelevanceLevel, ScoredPaper},
    pipeline::{PipelineEvent, PipelineOutcome, PipelineRequest, PipelineRunner, PipelineSession},
    provider::arxiv::ArxivProvider,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Interval between polls of a running job
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search binary CLI for LLM-reranked arXiv search
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search arXiv with LLM query expansion and relevance reranking",
    long_about = "Expand a research query into related search terms, gather candidate \
                  papers from arXiv for each term, and rank them by LLM-judged relevance.

Requires OPENAI_API_KEY. OPENAI_BASE_URL, OPENAI_MODEL and ARXIV_API_URL are optional.

EXAMPLES:
  Single query:
    search --query \"graph neural networks\"

  JSON output with more candidates per term:
    search --query \"diffusion models\" --max-results-per-term 10 --format json

  Interactive mode:
    search --interactive

  Top 10 results:
    search --query \"protein folding\" --top-n 10"
)]
struct Args {
    /// Research query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Papers fetched from arXiv per search term [default: 5]
    #[arg(long, value_name = "N")]
    max_results_per_term: Option<usize>,

    /// Number of results to show [default: 5]
    #[arg(long, value_name = "N")]
    top_n: Option<usize>,

    /// Chat model used for expansion and scoring (overrides OPENAI_MODEL)
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Build the pipeline runner from environment configuration
fn create_runner(config: AppConfig) -> Result<PipelineRunner> {
    info!("Using chat model: {} at {}", config.chat.model, config.chat.base_url);

    let chat = Arc::new(
        OpenAIChat::new(config.chat).with_context(|| "Failed to create chat client")?,
    );
    let arxiv = Arc::new(
        ArxivProvider::new(config.arxiv).with_context(|| "Failed to create arXiv client")?,
    );

    Ok(PipelineRunner::new(chat.clone(), arxiv, chat))
}

/// Create a spinner for tracking a running job
fn create_spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed}] {msg}")
            .with_context(|| "Invalid spinner template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

/// Poll the session's active job until its terminal event arrives
async fn drive_job(session: &mut PipelineSession) -> Result<PipelineEvent> {
    let spinner = create_spinner()?;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        ticker.tick().await;
        if !session.is_busy() {
            spinner.finish_and_clear();
            anyhow::bail!("No pipeline job is running");
        }
        for event in session.poll() {
            match event {
                PipelineEvent::Status(message) => {
                    debug!("{}", message);
                    spinner.set_message(message);
                }
                terminal => {
                    spinner.finish_and_clear();
                    return Ok(terminal);
                }
            }
        }
    }
}

/// Shorten `text` to at most `max` characters
fn truncate_display(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn relevance_label(level: RelevanceLevel) -> (&'static str, Color) {
    match level {
        RelevanceLevel::High => ("HIGH", Color::Green),
        RelevanceLevel::Medium => ("MEDIUM", Color::Yellow),
        RelevanceLevel::Low => ("LOW", Color::White),
        RelevanceLevel::Unscored => ("UNSCORED", Color::Red),
    }
}

/// Format results as a pretty table
fn format_results_table(results: &[ScoredPaper]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Relevance").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Justification").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        let (relevance_str, color) = relevance_label(result.relevance());
        let year = result
            .paper
            .publish_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate_display(&result.paper.title, 60)),
            Cell::new(truncate_display(&result.paper.authors.join(", "), 40)),
            Cell::new(year),
            Cell::new(relevance_str).fg(color),
            Cell::new(format!("{}/10", result.relevance_score)),
            Cell::new(truncate_display(&result.justification, 80)),
        ]);
    }

    table.to_string()
}

/// Format results as JSON
fn format_results_json(results: &[ScoredPaper]) -> Result<String> {
    serde_json::to_string_pretty(results)
        .with_context(|| "Failed to serialize results to JSON")
}

/// Display detailed view of a single result
fn display_result_detail(result: &ScoredPaper, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", result.paper.title);
    println!("Authors: {}", result.paper.authors.join(", "));
    if let Some(year) = result.paper.publish_year {
        println!("Year: {}", year);
    }
    if let Some(category) = &result.paper.primary_category {
        println!("Category: {}", category);
    }
    println!("Link: {}", result.paper.link);
    println!("Relevance: {:?}", result.relevance());
    println!("Score: {}/10", result.relevance_score);
    println!("Justification: {}", result.justification);
    println!("\nAbstract:\n{}", result.paper.abstract_text);
    println!("{}", "═".repeat(80));
}

/// Print the top results of a finished run
fn print_outcome(outcome: &PipelineOutcome, format: OutputFormat, elapsed: Duration) -> Result<()> {
    let top = outcome.top();
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(top));
            println!(
                "\nShowing {} of {} papers from {} terms ({} duplicates skipped, {} terms failed, {} papers unscored) in {:.2}s",
                top.len(),
                outcome.results.len(),
                outcome.aggregation.terms_searched,
                outcome.aggregation.duplicates_skipped,
                outcome.aggregation.terms_failed,
                outcome.rerank.failed,
                elapsed.as_secs_f64()
            );
        }
        OutputFormat::Json => {
            println!("{}", format_results_json(top)?);
        }
    }
    Ok(())
}

/// Editable term selection for the interactive mode
struct TermSelection {
    query: String,
    terms: Vec<(String, bool)>,
}

impl TermSelection {
    fn new(query: String, terms: Vec<String>) -> Self {
        Self {
            query,
            terms: terms.into_iter().map(|t| (t, true)).collect(),
        }
    }

    fn selected(&self) -> Vec<String> {
        self.terms
            .iter()
            .filter(|(_, on)| *on)
            .map(|(t, _)| t.clone())
            .collect()
    }

    fn print(&self) {
        println!("Search terms for '{}':", self.query);
        for (idx, (term, on)) in self.terms.iter().enumerate() {
            println!("  {:>2}. [{}] {}", idx + 1, if *on { "x" } else { " " }, term);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <query>          - Expand, search and rank in one step");
    println!("  /expand <query>  - Propose search terms for a query");
    println!("  /terms           - Show the current search terms");
    println!("  /toggle N        - Include or exclude term N");
    println!("  /search          - Search with the selected terms");
    println!("  /top N           - Set number of results to N");
    println!("  /format table    - Use table output format");
    println!("  /format json     - Use JSON output format");
    println!("  /detail N        - Show full details for result rank N");
    println!("  /help            - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Start a search job and print its results
async fn run_search(
    session: &mut PipelineSession,
    request: PipelineRequest,
    format: OutputFormat,
) -> Result<Vec<ScoredPaper>> {
    let start = Instant::now();
    session.start_search(request)?;

    match drive_job(session).await? {
        PipelineEvent::Results(outcome) => {
            print_outcome(&outcome, format, start.elapsed())?;
            Ok(outcome.top().to_vec())
        }
        PipelineEvent::Error(message) => anyhow::bail!(message),
        other => anyhow::bail!("Unexpected pipeline event: {:?}", other),
    }
}

/// Run interactive REPL mode
async fn run_interactive(
    mut session: PipelineSession,
    max_results_per_term: usize,
    mut top_n: usize,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Paper Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new()
        .with_context(|| "Failed to create readline editor")?;

    let mut selection: Option<TermSelection> = None;
    let mut last_results: Vec<ScoredPaper> = Vec::new();

    loop {
        let readline = rl.readline("Search> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)
                    .ok(); // Ignore errors from adding to history

                if !line.starts_with('/') {
                    let request = PipelineRequest::new(line)
                        .with_max_results_per_term(max_results_per_term)
                        .with_top_n(top_n);
                    match run_search(&mut session, request, format).await {
                        Ok(results) => last_results = results,
                        Err(e) => eprintln!("Search failed: {}", e),
                    }
                    continue;
                }

                let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
                let rest = rest.trim();
                match command {
                    "/help" => print_help(),
                    "/expand" => {
                        if rest.is_empty() {
                            eprintln!("Usage: /expand <query>");
                            continue;
                        }
                        if let Err(e) = session.start_expansion(rest) {
                            eprintln!("{}", e);
                            continue;
                        }
                        match drive_job(&mut session).await {
                            Ok(PipelineEvent::Terms(terms)) => {
                                let terms = TermSelection::new(rest.to_string(), terms);
                                terms.print();
                                selection = Some(terms);
                            }
                            Ok(PipelineEvent::Error(message)) => eprintln!("Expansion failed: {}", message),
                            Ok(other) => eprintln!("Unexpected pipeline event: {:?}", other),
                            Err(e) => eprintln!("Expansion failed: {}", e),
                        }
                    }
                    "/terms" => match &selection {
                        Some(terms) => terms.print(),
                        None => eprintln!("No terms yet. Use /expand <query> first."),
                    },
                    "/toggle" => {
                        let Some(terms) = selection.as_mut() else {
                            eprintln!("No terms yet. Use /expand <query> first.");
                            continue;
                        };
                        match rest.parse::<usize>() {
                            Ok(n) if n > 0 && n <= terms.terms.len() => {
                                let entry = &mut terms.terms[n - 1];
                                entry.1 = !entry.1;
                                terms.print();
                            }
                            _ => eprintln!("Invalid term number: must be between 1 and {}", terms.terms.len()),
                        }
                    }
                    "/search" => {
                        let Some(terms) = &selection else {
                            eprintln!("No terms yet. Use /expand <query> first.");
                            continue;
                        };
                        let request = PipelineRequest::new(terms.query.clone())
                            .with_terms(terms.selected())
                            .with_max_results_per_term(max_results_per_term)
                            .with_top_n(top_n);
                        match run_search(&mut session, request, format).await {
                            Ok(results) => last_results = results,
                            Err(e) => eprintln!("Search failed: {}", e),
                        }
                    }
                    "/top" => match rest.parse::<usize>() {
                        Ok(n) if n > 0 => {
                            top_n = n;
                            println!("Set top-n to {}", top_n);
                        }
                        _ => eprintln!("Invalid number: must be a positive integer"),
                    },
                    "/format" => match rest {
                        "table" => {
                            format = OutputFormat::Table;
                            println!("Set output format to table");
                        }
                        "json" => {
                            format = OutputFormat::Json;
                            println!("Set output format to JSON");
                        }
                        _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                    },
                    "/detail" => match rest.parse::<usize>() {
                        Ok(rank) if rank > 0 && rank <= last_results.len() => {
                            display_result_detail(&last_results[rank - 1], rank);
                        }
                        Ok(rank) if rank > last_results.len() => {
                            eprintln!("Rank {} out of range (last search had {} results)",
                                rank, last_results.len());
                        }
                        _ => eprintln!("Invalid rank: must be a positive integer"),
                    },
                    _ => eprintln!("Unknown command: {}. Type /help for available commands.", command),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query(
    mut session: PipelineSession,
    request: PipelineRequest,
    format: OutputFormat,
) -> Result<()> {
    run_search(&mut session, request, format).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);

    // Validate arguments
    let query = match (&args.query, args.interactive) {
        (_, true) => None,
        (Some(query), false) => Some(query.clone()),
        (None, false) => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };

    let mut config = AppConfig::from_env().with_context(|| "Failed to load configuration")?;
    if let Some(model) = args.model {
        config.chat.model = model;
    }
    let max_results_per_term = args
        .max_results_per_term
        .unwrap_or(config.defaults.max_results_per_term);
    let top_n = args.top_n.unwrap_or(config.defaults.top_n);
    if top_n == 0 || max_results_per_term == 0 {
        anyhow::bail!("--top-n and --max-results-per-term must be at least 1");
    }

    let runner = create_runner(config)?;
    let session = PipelineSession::new(runner);

    if let Some(query) = query {
        let request = PipelineRequest::new(query)
            .with_max_results_per_term(max_results_per_term)
            .with_top_n(top_n);
        // Reject caller-input errors before any network traffic
        request.validate()?;
        run_single_query(session, request, args.format).await?;
    } else {
        run_interactive(session, max_results_per_term, top_n, args.format).await?;
    }

    Ok(())
}
