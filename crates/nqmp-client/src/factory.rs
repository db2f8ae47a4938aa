//! Client factory: resolves a client name to an implementation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AnswerClient, ClientConfig, ClientError, EchoClient, OpenRouterClient};

/// Clients selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Echo,
    OpenRouter,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Echo => "echo",
            ClientKind::OpenRouter => "openrouter",
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "echo" => Ok(ClientKind::Echo),
            "openrouter" => Ok(ClientKind::OpenRouter),
            other => Err(ClientError::UnknownClient(other.to_string())),
        }
    }
}

/// Instantiate a client by kind.
pub fn client_from_name(
    kind: ClientKind,
    config: ClientConfig,
) -> Result<Box<dyn AnswerClient>, ClientError> {
    match kind {
        ClientKind::Echo => Ok(Box::new(EchoClient::new())),
        ClientKind::OpenRouter => Ok(Box::new(OpenRouterClient::new(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_kind() {
        assert_eq!("echo".parse::<ClientKind>().unwrap(), ClientKind::Echo);
        assert_eq!(
            "OpenRouter".parse::<ClientKind>().unwrap(),
            ClientKind::OpenRouter
        );
        assert!("gemini".parse::<ClientKind>().is_err());
    }

    #[test]
    fn test_echo_needs_no_key() {
        let client = client_from_name(ClientKind::Echo, ClientConfig::default()).unwrap();
        assert_eq!(client.name(), "echo");
    }

    #[test]
    fn test_openrouter_requires_key() {
        let result = client_from_name(ClientKind::OpenRouter, ClientConfig::default());
        assert!(matches!(result, Err(ClientError::MissingApiKey(_))));
    }
}
