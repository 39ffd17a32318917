//! Runtime configuration read from the environment.
//!
//! | Variable          | Required | Default                              |
//! |-------------------|----------|--------------------------------------|
//! | `OPENAI_API_KEY`  | yes      |                                      |
//! | `OPENAI_BASE_URL` | no       | `https://api.openai.com/v1`          |
//! | `OPENAI_MODEL`    | no       | `gpt-3.5-turbo`                      |
//! | `ARXIV_API_URL`   | no       | `http://export.arxiv.org/api/query`  |

use thiserror::Error;

use crate::llm::openai::OpenAIChatConfig;
use crate::provider::arxiv::ArxivConfig;
use crate::{DEFAULT_MAX_RESULTS_PER_TERM, DEFAULT_TOP_N};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const ARXIV_URL_VAR: &str = "ARXIV_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable required.\nSet it with: export {0}=your-api-key")]
    MissingVar(&'static str),

    #[error("{var} is not a valid URL: {value}")]
    InvalidUrl { var: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default limits for a search run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefaults {
    pub max_results_per_term: usize,
    pub top_n: usize,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            max_results_per_term: DEFAULT_MAX_RESULTS_PER_TERM,
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chat: OpenAIChatConfig,
    pub arxiv: ArxivConfig,
    pub defaults: PipelineDefaults,
}

impl AppConfig {
    /// Read configuration from process environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingVar` if `OPENAI_API_KEY` is unset or blank
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = var(API_KEY_VAR).ok_or(ConfigError::MissingVar(API_KEY_VAR))?;

        let mut chat = OpenAIChatConfig {
            api_key,
            ..OpenAIChatConfig::default()
        };
        if let Some(base_url) = var(BASE_URL_VAR) {
            chat.base_url = validate_url(BASE_URL_VAR, base_url)?;
        }
        if let Some(model) = var(MODEL_VAR) {
            chat.model = model;
        }

        let mut arxiv = ArxivConfig::default();
        if let Some(url) = var(ARXIV_URL_VAR) {
            arxiv.base_url = validate_url(ARXIV_URL_VAR, url)?;
        }

        Ok(Self {
            chat,
            arxiv,
            defaults: PipelineDefaults::default(),
        })
    }
}

fn validate_url(var: &'static str, value: String) -> ConfigResult<String> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidUrl { var, value })
    }
}
