//! NQMP Core Library
//!
//! Minimal-pair dataset generation, grading and the resumable execution loop.
//! The answering service itself lives behind `nqmp_client::AnswerClient`.

pub mod domain;
pub mod generator;
pub mod grader;
pub mod harness;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod retry;
pub mod synth;
pub mod telemetry;

pub use domain::{
    manifest_path, Answer, AnswerDomain, Context, Dataset, DatasetItem, DatasetManifest,
    NqmpError, OperatorKind, OperatorSpec, Params, Result, Variant, World, DATASET_FILE,
};

pub use generator::{
    generate, generate_pair, GenConfig, GENERATOR_VERSION, MAX_CONTEXT_ITEMS, MAX_RESAMPLES,
};
pub use grader::{aggregate, aggregate_pair, grade, normalize, NormalizedAnswer, RunMetrics};
pub use harness::{render_prompt, run, ItemState, RunOptions, RunSummary};
pub use ledger::{
    ErrorClass, FsRunLedger, LedgerError, LedgerRecord, MemoryRunLedger, RunInfo, RunLedger,
};
pub use reporting::{write_report, MetricsArtifact};
pub use retry::RetryPolicy;
pub use synth::{derive_seed, synthesize};
