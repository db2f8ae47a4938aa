//! In-memory fakes for the client trait (testing only)
//!
//! [`ScriptedClient`] replays queued failures per prompt before answering,
//! and counts every call so tests can assert on exactly-once behaviour.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{AnswerClient, ServiceError};

/// Client whose replies and failures are scripted per prompt.
#[derive(Debug)]
pub struct ScriptedClient {
    replies: HashMap<String, String>,
    failures: Mutex<HashMap<String, VecDeque<ServiceError>>>,
    default_reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new("Yes")
    }
}

impl ScriptedClient {
    /// Create a client answering `default_reply` to unscripted prompts.
    pub fn new(default_reply: &str) -> Self {
        Self {
            replies: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            default_reply: default_reply.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer `prompt` with `reply` once its scripted failures are used up.
    pub fn with_reply(mut self, prompt: &str, reply: &str) -> Self {
        self.replies.insert(prompt.to_string(), reply.to_string());
        self
    }

    /// Queue failures returned, in order, for the first calls with `prompt`.
    pub fn with_failures(self, prompt: &str, failures: Vec<ServiceError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(prompt.to_string())
            .or_default()
            .extend(failures);
        self
    }

    /// Total number of `ask` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls made with exactly `prompt`.
    pub fn calls_for(&self, prompt: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == prompt)
            .count()
    }
}

#[async_trait]
impl AnswerClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ask(&self, prompt: &str, _model: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next_failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(prompt)
            .and_then(|queue| queue.pop_front());
        if let Some(err) = next_failure {
            return Err(err);
        }

        Ok(self
            .replies
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| self.default_reply.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ServiceError {
        ServiceError::Transient {
            code: Some(503),
            message: "overloaded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failures_then_reply() {
        let client = ScriptedClient::new("No")
            .with_reply("q1", "A1,A2")
            .with_failures("q1", vec![transient(), transient()]);

        assert!(client.ask("q1", "m").await.is_err());
        assert!(client.ask("q1", "m").await.is_err());
        assert_eq!(client.ask("q1", "m").await.unwrap(), "A1,A2");
        assert_eq!(client.ask("other", "m").await.unwrap(), "No");
        assert_eq!(client.calls(), 4);
        assert_eq!(client.calls_for("q1"), 3);
    }
}
