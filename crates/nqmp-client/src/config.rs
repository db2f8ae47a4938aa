//! Client configuration
//!
//! Read from environment variables. The CLI loads a `.env` file first, so
//! the same keys can live there.

use serde::{Deserialize, Serialize};

/// Default chat completions endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when neither `--model` nor `MODEL_NAME` is given.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Answering-service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// API key (`OPENROUTER_API_KEY`)
    pub api_key: Option<String>,
    /// Chat completions URL (`OPENROUTER_BASE_URL`)
    pub base_url: String,
    /// Default model (`MODEL_NAME`)
    pub default_model: String,
    /// Optional ranking header `HTTP-Referer` (`OPENROUTER_HTTP_REFERER`)
    pub site_url: Option<String>,
    /// Optional ranking header `X-Title` (`OPENROUTER_X_TITLE`)
    pub site_title: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            site_url: None,
            site_title: None,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    /// Create a config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        ClientConfig {
            api_key: non_empty_var("OPENROUTER_API_KEY"),
            base_url: non_empty_var("OPENROUTER_BASE_URL").unwrap_or(defaults.base_url),
            default_model: non_empty_var("MODEL_NAME").unwrap_or(defaults.default_model),
            site_url: non_empty_var("OPENROUTER_HTTP_REFERER"),
            site_title: non_empty_var("OPENROUTER_X_TITLE"),
            ..defaults
        }
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
