//! NQMP-Client: answering-service boundary for the NQMP harness
//!
//! This crate owns everything that talks to (or stands in for) the model
//! being evaluated. The harness only sees the [`AnswerClient`] trait and the
//! two-class [`ServiceError`] taxonomy; retry scheduling lives in the harness.
//!
//! ## Clients
//!
//! - [`EchoClient`]: offline stub with deterministic pseudo-answers
//! - [`OpenRouterClient`]: OpenAI-compatible chat completions over HTTPS
//! - [`fakes::ScriptedClient`]: scripted failures and replies for tests

mod config;
mod echo;
mod error;
pub mod fakes;
mod factory;
mod openrouter;

pub use config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use echo::EchoClient;
pub use error::{is_transient_status, ClientError, ServiceError, TRANSIENT_STATUS_CODES};
pub use factory::{client_from_name, ClientKind};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;

/// A service that answers one rendered prompt at a time.
///
/// Implementations perform exactly one request per call. They classify
/// failures as [`ServiceError::Transient`] or [`ServiceError::Fatal`] and
/// never retry internally.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Short client name recorded in run metadata (e.g. `"echo"`).
    fn name(&self) -> &str;

    /// Ask `prompt` of `model`, returning the raw response text.
    async fn ask(&self, prompt: &str, model: &str) -> Result<String, ServiceError>;
}
