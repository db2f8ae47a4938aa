//! Run ledger: the durable, append-only record of which items are done.
//!
//! A record is terminal once appended: graded items and items that ended in
//! an `llm_error` are both skipped on resume. The per-call log is separate
//! and never consulted for membership.

pub mod fs;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::dataset::{Answer, AnswerDomain, Variant};
use crate::domain::operator::OperatorKind;
use crate::grader::NormalizedAnswer;

pub use fs::FsRunLedger;
pub use memory::MemoryRunLedger;

/// Ledger failures. All of them abort a run.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot resume: {field} recorded as {recorded}, requested {requested}")]
    IncompatibleResume {
        field: &'static str,
        recorded: String,
        requested: String,
    },

    #[error("corrupt ledger at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("item already recorded: {0}")]
    DuplicateItem(String),

    #[error("output directory already holds a run; pass --resume to continue it")]
    AlreadyInitialized,
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Identity of a run, persisted as `run_info.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub seed: Option<u64>,
    pub pair_count: usize,
    pub dataset_digest: String,
    pub client: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new(
        seed: Option<u64>,
        pair_count: usize,
        dataset_digest: impl Into<String>,
        client: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            seed,
            pair_count,
            dataset_digest: dataset_digest.into(),
            client: client.into(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }

    /// Fail with the first identity field that differs from `requested`.
    pub fn check_compatible(&self, requested: &RunInfo) -> LedgerResult<()> {
        let fields: [(&'static str, String, String); 5] = [
            (
                "seed",
                format!("{:?}", self.seed),
                format!("{:?}", requested.seed),
            ),
            (
                "pair_count",
                self.pair_count.to_string(),
                requested.pair_count.to_string(),
            ),
            (
                "dataset_digest",
                self.dataset_digest.clone(),
                requested.dataset_digest.clone(),
            ),
            ("client", self.client.clone(), requested.client.clone()),
            ("model", self.model.clone(), requested.model.clone()),
        ];
        for (field, recorded, requested) in fields {
            if recorded != requested {
                return Err(LedgerError::IncompatibleResume {
                    field,
                    recorded,
                    requested,
                });
            }
        }
        Ok(())
    }
}

/// A graded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedRecord {
    pub item_id: String,
    pub pair_id: String,
    pub operator: OperatorKind,
    pub variant: Variant,
    pub question: String,
    pub raw_response: String,
    pub normalized: NormalizedAnswer,
    pub gold: Answer,
    pub answer_type: AnswerDomain,
    pub correct: bool,
    pub attempts: u32,
    pub latency_ms: u64,
    pub recorded_at: DateTime<Utc>,
    /// Joint correctness, set on the record that completes its pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_correct: Option<bool>,
}

/// Why an item ended without an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Fatal,
    RetriesExhausted,
}

/// An item the service never answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub item_id: String,
    pub pair_id: String,
    pub operator: OperatorKind,
    pub variant: Variant,
    pub question: String,
    pub error: String,
    pub class: ErrorClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// One line of `predictions.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LedgerRecord {
    Graded(GradedRecord),
    LlmError(ErrorRecord),
}

impl LedgerRecord {
    pub fn item_id(&self) -> &str {
        match self {
            LedgerRecord::Graded(r) => &r.item_id,
            LedgerRecord::LlmError(r) => &r.item_id,
        }
    }

    pub fn pair_id(&self) -> &str {
        match self {
            LedgerRecord::Graded(r) => &r.pair_id,
            LedgerRecord::LlmError(r) => &r.pair_id,
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            LedgerRecord::Graded(r) => r.variant,
            LedgerRecord::LlmError(r) => r.variant,
        }
    }

    pub fn operator(&self) -> OperatorKind {
        match self {
            LedgerRecord::Graded(r) => r.operator,
            LedgerRecord::LlmError(r) => r.operator,
        }
    }

    /// Errors count as incorrect.
    pub fn is_correct(&self) -> bool {
        matches!(self, LedgerRecord::Graded(r) if r.correct)
    }

    pub fn is_fatal_error(&self) -> bool {
        matches!(self, LedgerRecord::LlmError(r) if r.class == ErrorClass::Fatal)
    }
}

/// Outcome of a single client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ok,
    TransientError,
    FatalError,
}

/// One line of `run.log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttempt {
    pub recorded_at: DateTime<Utc>,
    pub item_id: String,
    pub attempt: u32,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Append-only run ledger.
///
/// Guarantees:
/// - `append` makes a record durable before `contains` reports it.
/// - An item id is appended at most once.
/// - `records` returns committed records in append order.
pub trait RunLedger: Send {
    /// Whether `item_id` already has a terminal record.
    fn contains(&self, item_id: &str) -> bool;

    /// Append a terminal record. Fails with `DuplicateItem` if already present.
    fn append(&mut self, record: LedgerRecord) -> LedgerResult<()>;

    /// Append one call attempt to the run log.
    fn log_attempt(&mut self, attempt: &CallAttempt) -> LedgerResult<()>;

    /// All committed records, in append order.
    fn records(&self) -> &[LedgerRecord];

    /// Whether any committed record is a fatal-class error.
    fn has_fatal_errors(&self) -> bool {
        self.records().iter().any(LedgerRecord::is_fatal_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(model: &str) -> RunInfo {
        RunInfo::new(Some(42), 100, "abc", "echo", model)
    }

    #[test]
    fn test_compatible_run_info() {
        assert!(info("m").check_compatible(&info("m")).is_ok());
    }

    #[test]
    fn test_incompatible_run_info_names_field() {
        match info("m1").check_compatible(&info("m2")) {
            Err(LedgerError::IncompatibleResume {
                field,
                recorded,
                requested,
            }) => {
                assert_eq!(field, "model");
                assert_eq!(recorded, "m1");
                assert_eq!(requested, "m2");
            }
            other => panic!("expected IncompatibleResume, got {other:?}"),
        }
    }

    #[test]
    fn test_error_record_tagged_outcome() {
        let record = LedgerRecord::LlmError(ErrorRecord {
            item_id: "0123456789abcdef".to_string(),
            pair_id: "pair_0000".to_string(),
            operator: OperatorKind::Negation,
            variant: Variant::B,
            question: "List ids that are not ok.".to_string(),
            error: "bad request".to_string(),
            class: ErrorClass::Fatal,
            code: Some(400),
            attempts: 1,
            recorded_at: Utc::now(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "llm_error");
        assert_eq!(json["class"], "fatal");
        assert_eq!(json["operator"], "negation");
        assert!(record.is_fatal_error());
        assert!(!record.is_correct());

        let back: LedgerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
