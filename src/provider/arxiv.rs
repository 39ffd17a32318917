//! arXiv API provider implementation.
//!
//! Queries the public arXiv export API and parses its Atom feed into
//! `Paper` values. The API is rate limited on the server side (roughly one
//! request every three seconds); 429 and 503 responses are reported as
//! `ProviderError::RateLimitExceeded` so callers can tell them apart from
//! hard network failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{PaperProvider, ProviderError, ProviderResult};
use crate::models::Paper;

/// Default arXiv API endpoint.
pub const DEFAULT_ARXIV_URL: &str = "http://export.arxiv.org/api/query";

/// Configuration for the arXiv provider.
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    /// Query endpoint
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ARXIV_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,

    #[serde(default)]
    published: Option<String>,

    #[serde(default)]
    title: String,

    #[serde(default)]
    summary: String,

    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,

    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,

    #[serde(rename = "primary_category", alias = "arxiv:primary_category", default)]
    primary_category: Option<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,

    #[serde(rename = "@rel", default)]
    rel: Option<String>,

    #[serde(rename = "@title", default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

impl AtomEntry {
    /// arXiv reports query errors as a feed entry whose id points at the
    /// API error documentation.
    fn is_api_error(&self) -> bool {
        self.id.contains("/api/errors")
    }

    fn pdf_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| {
                link.title.as_deref() == Some("pdf") && link.rel.as_deref() == Some("related")
            })
            .map(|link| link.href.as_str())
    }

    fn into_paper(self) -> Paper {
        let link = self
            .pdf_link()
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone());

        let publish_year = self
            .published
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok());

        Paper {
            title: collapse_whitespace(&self.title),
            authors: self
                .authors
                .into_iter()
                .map(|a| collapse_whitespace(&a.name))
                .collect(),
            abstract_text: collapse_whitespace(&self.summary),
            link,
            source_id: Some(self.id).filter(|id| !id.is_empty()),
            publish_year,
            primary_category: self.primary_category.map(|c| c.term),
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse an arXiv Atom feed into papers, preserving feed order.
///
/// # Errors
/// Returns `ProviderError::ParseError` for malformed XML and
/// `ProviderError::QueryRejected` when the feed carries an API error entry
pub fn parse_feed(xml: &str) -> ProviderResult<Vec<Paper>> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)
        .map_err(|e| ProviderError::ParseError(format!("invalid Atom feed: {}", e)))?;

    if let Some(error) = feed.entries.iter().find(|e| e.is_api_error()) {
        return Err(ProviderError::QueryRejected(collapse_whitespace(&error.summary)));
    }

    Ok(feed
        .entries
        .into_iter()
        .filter(|entry| !entry.title.trim().is_empty())
        .map(AtomEntry::into_paper)
        .collect())
}

/// Paper provider backed by the arXiv export API.
#[derive(Debug, Clone)]
pub struct ArxivProvider {
    client: reqwest::Client,
    config: ArxivConfig,
}

impl ArxivProvider {
    /// Create a new arXiv provider.
    ///
    /// # Errors
    /// Returns `ProviderError::ConfigError` if the HTTP client cannot be built
    pub fn new(config: ArxivConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("llm-paper-search/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaperProvider for ArxivProvider {
    async fn fetch(&self, term: &str, limit: usize) -> ProviderResult<Vec<Paper>> {
        let max_results = limit.to_string();
        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("search_query", term),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ProviderError::RateLimitExceeded(format!("arXiv returned {}", status)));
        }
        if !status.is_success() {
            return Err(ProviderError::NetworkError(format!("arXiv returned {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(format!("failed to read response body: {}", e)))?;

        let mut papers = parse_feed(&body)?;
        papers.truncate(limit);
        debug!(term, count = papers.len(), "arXiv query returned");
        Ok(papers)
    }

    fn name(&self) -> &str {
        "arXiv"
    }
}
