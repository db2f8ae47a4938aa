//! Offline echo stub.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{AnswerClient, ServiceError};

/// Marks a list question inside a rendered prompt.
const LIST_QUESTION: &str = "List ids";

/// Deterministic offline client.
///
/// Each reply is a pure function of `(seed, prompt)`: `Yes` or `No` for
/// yes/no questions, and zero to two placeholder ids (`X1,X2`) for list
/// questions. It never fails, so it works as a smoke run and a chance-level
/// floor.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoClient {
    seed: u64,
}

impl EchoClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// The reply `ask` returns for `prompt`.
    pub fn reply(&self, prompt: &str) -> String {
        let roll = self.roll(prompt);
        if prompt.contains(LIST_QUESTION) {
            (1..=roll % 3)
                .map(|n| format!("X{n}"))
                .collect::<Vec<_>>()
                .join(",")
        } else if roll % 2 == 0 {
            "Yes".to_string()
        } else {
            "No".to_string()
        }
    }

    fn roll(&self, prompt: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(prompt.as_bytes());
        let digest = hasher.finalize();
        let head = digest[..8]
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        head % 100
    }
}

#[async_trait]
impl AnswerClient for EchoClient {
    fn name(&self) -> &str {
        "echo"
    }

    async fn ask(&self, prompt: &str, _model: &str) -> Result<String, ServiceError> {
        Ok(self.reply(prompt))
    }
}
