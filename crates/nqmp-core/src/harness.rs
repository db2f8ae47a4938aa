//! Resumable execution loop.
//!
//! Items are processed strictly in dataset order, one client call at a time.
//! Each item moves `Pending -> Skipped` when the ledger already holds it, or
//! `Pending -> InFlight -> Graded | Errored` otherwise. A per-item service
//! failure becomes an `llm_error` record and never stops the run; a ledger
//! failure does.

use std::collections::HashMap;

use chrono::Utc;
use nqmp_client::{AnswerClient, ServiceError};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use crate::domain::dataset::{Dataset, DatasetItem, Variant};
use crate::domain::error::Result;
use crate::grader::{aggregate_pair, grade, normalize};
use crate::ledger::{
    CallAttempt, CallStatus, ErrorClass, ErrorRecord, GradedRecord, LedgerRecord, RunLedger,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::RetryPolicy;

/// Prompt sent for every item.
pub const PROMPT_TEMPLATE: &str = "You will be given a tiny context and a question.
- If the question is yes/no, answer exactly 'Yes' or 'No'.
- If the question asks to list ids, return a comma-separated list of ids with no spaces.
- Do not add any extra text.

CONTEXT:
{context}

QUESTION:
{question}
";

/// Render the prompt for `item`.
pub fn render_prompt(item: &DatasetItem) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", &item.context.render_table())
        .replace("{question}", &item.question)
}

/// Per-run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub run_id: String,
    pub model: String,
    pub retry: RetryPolicy,
}

impl RunOptions {
    pub fn new(run_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model: model.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Lifecycle state of one item within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Skipped,
    InFlight,
    Graded,
    Errored,
}

/// Terminal state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: String,
    pub state: ItemState,
}

/// What a call to [`run`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_items: usize,
    pub skipped: usize,
    pub graded: usize,
    pub errored_fatal: usize,
    pub errored_exhausted: usize,
    pub client_calls: u64,
    pub retries: u64,
    pub items: Vec<ItemOutcome>,
    /// Whether the ledger, including records from earlier sessions, holds a
    /// fatal-class error.
    pub has_fatal_errors: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn errored(&self) -> usize {
        self.errored_fatal + self.errored_exhausted
    }
}

enum CallOutcome {
    Answered {
        text: String,
        attempts: u32,
        latency_ms: u64,
    },
    Failed {
        error: ServiceError,
        class: ErrorClass,
        attempts: u32,
    },
}

#[derive(Default)]
struct Counters {
    calls: u64,
    retries: u64,
    fatal: usize,
    exhausted: usize,
}

/// Run every item of `dataset` that `ledger` does not already hold.
pub async fn run(
    dataset: &Dataset,
    client: &dyn AnswerClient,
    ledger: &mut dyn RunLedger,
    options: &RunOptions,
) -> Result<RunSummary> {
    run_items(dataset, client, ledger, options)
        .instrument(obs::run_span(&options.run_id))
        .await
}

async fn run_items(
    dataset: &Dataset,
    client: &dyn AnswerClient,
    ledger: &mut dyn RunLedger,
    options: &RunOptions,
) -> Result<RunSummary> {
    let started = Instant::now();
    obs::emit_run_started(
        &options.run_id,
        client.name(),
        &options.model,
        dataset.items.len(),
        ledger.records().len(),
    );

    let mut outcomes: HashMap<(String, Variant), bool> = ledger
        .records()
        .iter()
        .map(|r| ((r.pair_id().to_string(), r.variant()), r.is_correct()))
        .collect();
    let mut states = vec![ItemState::Pending; dataset.items.len()];
    let mut counters = Counters::default();

    for (idx, item) in dataset.items.iter().enumerate() {
        if ledger.contains(&item.item_id) {
            states[idx] = ItemState::Skipped;
            METRICS.inc_skipped();
            obs::emit_item_skipped(&item.item_id);
            continue;
        }

        states[idx] = ItemState::InFlight;
        let prompt = render_prompt(item);
        let outcome =
            call_with_retry(client, ledger, &prompt, item, options, &mut counters).await?;

        let (record, correct, state) = match outcome {
            CallOutcome::Answered {
                text,
                attempts,
                latency_ms,
            } => {
                let normalized = normalize(&text, item.answer_type);
                let correct = grade(item, &normalized);
                let partner = outcomes.get(&(item.pair_id.clone(), other(item.variant)));
                obs::emit_item_graded(
                    &item.item_id,
                    item.operator.name(),
                    correct,
                    attempts,
                    latency_ms,
                );
                let record = LedgerRecord::Graded(GradedRecord {
                    item_id: item.item_id.clone(),
                    pair_id: item.pair_id.clone(),
                    operator: item.operator,
                    variant: item.variant,
                    question: item.question.clone(),
                    raw_response: text,
                    normalized,
                    gold: item.answer.clone(),
                    answer_type: item.answer_type,
                    correct,
                    attempts,
                    latency_ms,
                    recorded_at: Utc::now(),
                    pair_correct: partner.map(|p| aggregate_pair(*p, correct)),
                });
                (record, correct, ItemState::Graded)
            }
            CallOutcome::Failed {
                error,
                class,
                attempts,
            } => {
                let class_name = match class {
                    ErrorClass::Fatal => {
                        counters.fatal += 1;
                        "fatal"
                    }
                    ErrorClass::RetriesExhausted => {
                        counters.exhausted += 1;
                        "retries_exhausted"
                    }
                };
                obs::emit_item_errored(&item.item_id, class_name, error.code(), error.message());
                let record = LedgerRecord::LlmError(ErrorRecord {
                    item_id: item.item_id.clone(),
                    pair_id: item.pair_id.clone(),
                    operator: item.operator,
                    variant: item.variant,
                    question: item.question.clone(),
                    error: error.to_string(),
                    class,
                    code: error.code(),
                    attempts,
                    recorded_at: Utc::now(),
                });
                (record, false, ItemState::Errored)
            }
        };

        ledger.append(record)?;
        outcomes.insert((item.pair_id.clone(), item.variant), correct);
        states[idx] = state;
        match state {
            ItemState::Graded => METRICS.inc_graded(),
            _ => METRICS.inc_errored(),
        }
    }

    let mut summary = RunSummary {
        total_items: dataset.items.len(),
        skipped: 0,
        graded: 0,
        errored_fatal: counters.fatal,
        errored_exhausted: counters.exhausted,
        client_calls: counters.calls,
        retries: counters.retries,
        items: Vec::with_capacity(dataset.items.len()),
        has_fatal_errors: ledger.has_fatal_errors(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    for (item, state) in dataset.items.iter().zip(states) {
        match state {
            ItemState::Skipped => summary.skipped += 1,
            ItemState::Graded => summary.graded += 1,
            _ => {}
        }
        summary.items.push(ItemOutcome {
            item_id: item.item_id.clone(),
            state,
        });
    }
    obs::emit_run_finished(
        &options.run_id,
        summary.duration_ms,
        summary.graded,
        summary.errored(),
        summary.skipped,
        summary.has_fatal_errors,
    );
    METRICS.flush();
    Ok(summary)
}

fn other(variant: Variant) -> Variant {
    match variant {
        Variant::A => Variant::B,
        Variant::B => Variant::A,
    }
}

async fn call_with_retry(
    client: &dyn AnswerClient,
    ledger: &mut dyn RunLedger,
    prompt: &str,
    item: &DatasetItem,
    options: &RunOptions,
    counters: &mut Counters,
) -> Result<CallOutcome> {
    let max_attempts = options.retry.max_attempts();
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        counters.calls += 1;
        METRICS.inc_client_calls();

        let call_started = Instant::now();
        let result = client.ask(prompt, &options.model).await;
        let elapsed_ms = call_started.elapsed().as_millis() as u64;

        let (status, code, message) = match &result {
            Ok(_) => (CallStatus::Ok, None, None),
            Err(err) if err.is_transient() => (
                CallStatus::TransientError,
                err.code(),
                Some(err.message().to_string()),
            ),
            Err(err) => (
                CallStatus::FatalError,
                err.code(),
                Some(err.message().to_string()),
            ),
        };
        ledger.log_attempt(&CallAttempt {
            recorded_at: Utc::now(),
            item_id: item.item_id.clone(),
            attempt,
            status,
            code,
            elapsed_ms,
            message,
        })?;

        match result {
            Ok(text) => {
                return Ok(CallOutcome::Answered {
                    text,
                    attempts: attempt,
                    latency_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(error) if !error.is_transient() => {
                return Ok(CallOutcome::Failed {
                    error,
                    class: ErrorClass::Fatal,
                    attempts: attempt,
                })
            }
            Err(error) if attempt >= max_attempts => {
                return Ok(CallOutcome::Failed {
                    error,
                    class: ErrorClass::RetriesExhausted,
                    attempts: attempt,
                })
            }
            Err(error) => {
                let delay = options.retry.delay(attempt);
                counters.retries += 1;
                METRICS.inc_retries();
                obs::emit_call_retry(
                    &item.item_id,
                    attempt,
                    error.code(),
                    delay.as_millis() as u64,
                    error.message(),
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nqmp_client::fakes::ScriptedClient;
    use nqmp_client::EchoClient;

    use super::*;
    use crate::generator::{generate, GenConfig};
    use crate::ledger::MemoryRunLedger;

    fn dataset(pairs: usize) -> Dataset {
        generate(&GenConfig {
            pair_count: pairs,
            seed: 11,
            ..GenConfig::default()
        })
        .unwrap()
    }

    fn gold_client(dataset: &Dataset) -> ScriptedClient {
        dataset.items.iter().fold(ScriptedClient::new("?"), |client, item| {
            client.with_reply(&render_prompt(item), &item.answer.to_string())
        })
    }

    #[test]
    fn test_render_prompt_embeds_context_and_question() {
        let ds = dataset(1);
        let prompt = render_prompt(&ds.items[0]);
        assert!(prompt.starts_with("You will be given a tiny context and a question."));
        assert!(prompt.contains(&ds.items[0].context.render_table()));
        assert!(prompt.contains(&format!("QUESTION:\n{}\n", ds.items[0].question)));
    }

    #[tokio::test]
    async fn test_gold_answers_score_perfectly() {
        let ds = dataset(15);
        let client = gold_client(&ds);
        let mut ledger = MemoryRunLedger::new();
        let summary = run(&ds, &client, &mut ledger, &RunOptions::new("t", "m"))
            .await
            .unwrap();
        assert_eq!(summary.graded, 30);
        assert_eq!(summary.client_calls, 30);
        assert!(ledger.records().iter().all(LedgerRecord::is_correct));

        let completed: Vec<_> = ledger
            .records()
            .iter()
            .filter_map(|r| match r {
                LedgerRecord::Graded(g) => g.pair_correct,
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![true; 15]);
    }

    #[tokio::test]
    async fn test_second_pass_skips_everything() {
        let ds = dataset(3);
        let mut ledger = MemoryRunLedger::new();
        let options = RunOptions::new("t", "m");
        run(&ds, &EchoClient::new(), &mut ledger, &options).await.unwrap();

        let client = ScriptedClient::new("Yes");
        let summary = run(&ds, &client, &mut ledger, &options).await.unwrap();
        assert_eq!(summary.skipped, 6);
        assert_eq!(client.calls(), 0);
        assert!(summary.items.iter().all(|o| o.state == ItemState::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_become_llm_error() {
        let ds = dataset(1);
        let prompt = render_prompt(&ds.items[0]);
        let failures = (0..5)
            .map(|_| ServiceError::Transient {
                code: Some(429),
                message: "rate limited".to_string(),
            })
            .collect();
        let client = ScriptedClient::new("Yes").with_failures(&prompt, failures);
        let mut ledger = MemoryRunLedger::new();

        let before = Instant::now();
        let summary = run(&ds, &client, &mut ledger, &RunOptions::new("t", "m"))
            .await
            .unwrap();
        assert_eq!(summary.errored_exhausted, 1);
        assert_eq!(summary.retries, 4);
        assert!(!summary.has_fatal_errors);
        assert_eq!(client.calls_for(&prompt), 5);
        // 0.8 + 1.6 + 3.2 + 6.4 seconds of backoff on the paused clock.
        assert!(before.elapsed() >= std::time::Duration::from_millis(12_000));
        assert_eq!(ledger.attempts().len(), 6);
    }
}
