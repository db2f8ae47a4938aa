//! OpenRouter-compatible chat completions client
//!
//! One POST per [`AnswerClient::ask`] call. Status classification follows
//! [`is_transient_status`](crate::is_transient_status); transport failures
//! (timeouts, connection errors) are transient, everything else is fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{AnswerClient, ClientConfig, ClientError, ServiceError};

const SYSTEM_PROMPT: &str = "Answer strictly with either 'Yes'/'No' or a comma-separated id list \
     depending on the question. No extra text.";

/// Chat completions client for OpenRouter and API-compatible gateways
pub struct OpenRouterClient {
    config: ClientConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenRouterClient {
    /// Create a new client. Fails when no API key is configured.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ClientError::MissingApiKey("OPENROUTER_API_KEY"))?;

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("nqmp-client/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(OpenRouterClient {
            config,
            api_key,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    fn request_body(&self, prompt: &str, model: &str) -> Value {
        serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.config.temperature,
        })
    }
}

/// Pull the first choice's message content out of a completions payload.
fn extract_content(data: &Value) -> Option<String> {
    data.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.trim().to_string())
}

fn classify_transport(err: &reqwest::Error) -> ServiceError {
    let message = err.to_string();
    if let Some(status) = err.status() {
        return ServiceError::from_status(status.as_u16(), message);
    }
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ServiceError::Transient {
            code: None,
            message,
        }
    } else {
        ServiceError::Fatal {
            code: None,
            message,
        }
    }
}

#[async_trait]
impl AnswerClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn ask(&self, prompt: &str, model: &str) -> Result<String, ServiceError> {
        let mut request = self
            .http_client
            .post(&self.config.base_url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, model));
        if let Some(url) = &self.config.site_url {
            request = request.header("HTTP-Referer", url);
        }
        if let Some(title) = &self.config.site_title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await.map_err(|e| {
            warn!(base = %self.config.base_url, error = %e, "chat request failed");
            classify_transport(&e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| classify_transport(&e))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "chat endpoint returned an error status");
            return Err(ServiceError::from_status(status.as_u16(), body));
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| ServiceError::Fatal {
            code: Some(status.as_u16()),
            message: format!("invalid completions JSON: {e}"),
        })?;

        let content = extract_content(&data).ok_or_else(|| ServiceError::Fatal {
            code: Some(status.as_u16()),
            message: "completions payload has no choices[0].message.content".to_string(),
        })?;
        debug!(model = %model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = OpenRouterClient::new(ClientConfig::default());
        assert!(matches!(result, Err(ClientError::MissingApiKey(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let client =
            OpenRouterClient::new(ClientConfig::default().with_api_key("sk-test")).unwrap();
        let body = client.request_body("Is the sky green?", "some/model");
        assert_eq!(body["model"], "some/model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Is the sky green?");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_extract_content_trims() {
        let data = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Yes \n" } }]
        });
        assert_eq!(extract_content(&data).as_deref(), Some("Yes"));
    }

    #[test]
    fn test_extract_content_missing() {
        let data = serde_json::json!({ "error": { "message": "nope" } });
        assert!(extract_content(&data).is_none());
    }
}
