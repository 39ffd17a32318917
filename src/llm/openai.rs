//! OpenAI-compatible chat completion client.
//!
//! This module implements both `TermProposer` and `RelevanceScorer` on top of
//! the `/chat/completions` endpoint. Any server speaking the same protocol
//! (OpenAI, Azure deployments behind a proxy, local gateways) can be used by
//! pointing `base_url` at it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parse::{parse_comma_list, parse_ranking};
use super::prompts::{expansion_prompt, ranking_prompt, SYSTEM_PROMPT};
use super::{LlmError, LlmResult, RelevanceScorer, TermProposer};
use crate::models::Ranking;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for the chat completion client.
#[derive(Debug, Clone)]
pub struct OpenAIChatConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Base URL without the trailing `/chat/completions`
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for OpenAIChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client.
///
/// Holds a single `reqwest::Client` so connections are pooled across the
/// expansion call and all scoring calls of a run.
#[derive(Debug, Clone)]
pub struct OpenAIChat {
    client: reqwest::Client,
    config: OpenAIChatConfig,
}

impl OpenAIChat {
    /// Create a new chat client.
    ///
    /// # Errors
    /// Returns `LlmError::ConfigError` if the API key is empty or the HTTP
    /// client cannot be built
    pub fn new(config: OpenAIChatConfig) -> LlmResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError("API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Model identifier this client sends requests to.
    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Send one user message and return the assistant's text.
    async fn complete(&self, user_prompt: &str) -> LlmResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(format!("HTTP error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                LlmError::RateLimited(body)
            } else {
                LlmError::ApiError(format!("API returned {}: {}", status, body))
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ApiError(format!("failed to read response body: {}", e)))?;

        let content = extract_content(&body)?;
        debug!(model = %self.config.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

/// Pull the first choice's message text out of a chat completion body.
fn extract_content(body: &str) -> LlmResult<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("invalid completion JSON: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::MalformedResponse("completion has no content".to_string()))
}

#[async_trait]
impl TermProposer for OpenAIChat {
    async fn propose_terms(&self, query: &str) -> LlmResult<Vec<String>> {
        let content = self.complete(&expansion_prompt(query)).await?;
        parse_comma_list(&content)
    }
}

#[async_trait]
impl RelevanceScorer for OpenAIChat {
    async fn score(&self, query: &str, title: &str, abstract_text: &str) -> LlmResult<Ranking> {
        let content = self
            .complete(&ranking_prompt(query, title, abstract_text))
            .await?;
        parse_ranking(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CannedServer;

    fn chat_for(server: &CannedServer) -> OpenAIChat {
        OpenAIChat::new(OpenAIChatConfig {
            api_key: "sk-test".to_string(),
            base_url: server.base_url.clone(),
            ..OpenAIChatConfig::default()
        })
        .unwrap()
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_propose_terms_over_http() {
        let server = CannedServer::start(200, "application/json", &completion("message passing, GNN")).await;
        let chat = chat_for(&server);

        let terms = chat.propose_terms("graph neural networks").await.unwrap();
        assert_eq!(terms, vec!["message passing", "GNN"]);

        let request = server.request().await;
        let lowered = request.to_lowercase();
        assert!(request.starts_with("POST /chat/completions HTTP/1.1"));
        assert!(lowered.contains("authorization: bearer sk-test"));
        assert!(request.contains(r#""model":"gpt-3.5-turbo""#));
        assert!(request.contains("graph neural networks"));
    }

    #[tokio::test]
    async fn test_score_over_http() {
        let answer = r#"{"relevance_score": 8, "justification": "On topic."}"#;
        let server = CannedServer::start(200, "application/json", &completion(answer)).await;
        let chat = chat_for(&server);

        let ranking = chat.score("q", "Title", "Abstract").await.unwrap();
        assert_eq!(ranking.relevance_score, 8);
        assert_eq!(ranking.justification, "On topic.");
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let server = CannedServer::start(429, "application/json", r#"{"error": "slow down"}"#).await;
        let result = chat_for(&server).propose_terms("q").await;
        assert!(matches!(result, Err(LlmError::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = CannedServer::start(500, "text/plain", "boom").await;
        match chat_for(&server).score("q", "t", "a").await {
            Err(LlmError::ApiError(msg)) => assert!(msg.contains("500")),
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let result = OpenAIChat::new(OpenAIChatConfig::default());
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let chat = OpenAIChat::new(OpenAIChatConfig {
            api_key: "sk-test".to_string(),
            base_url: "http://localhost:8080/v1/".to_string(),
            ..OpenAIChatConfig::default()
        })
        .unwrap();
        assert_eq!(chat.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(chat.model_name(), DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_extract_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "a, b, c"}, "finish_reason": "stop"}
            ]
        }"#;
        assert_eq!(extract_content(body).unwrap(), "a, b, c");
    }

    #[test]
    fn test_extract_content_missing_or_empty() {
        assert!(matches!(
            extract_content(r#"{"choices": []}"#),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_content(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(LlmError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_content("<html>bad gateway</html>"),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "m",
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
