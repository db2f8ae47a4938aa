//! Report artifacts for a finished (or partial) run.
//!
//! - `metrics.json`: run identity plus [`RunMetrics`]
//! - `report.md`: human-readable summary with a per-operator table
//! - `correct_predictions.jsonl` / `incorrect_predictions.jsonl`: record splits

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grader::{aggregate, RunMetrics};
use crate::ledger::{FsRunLedger, LedgerRecord, RunInfo};

pub const METRICS_FILE: &str = "metrics.json";
pub const REPORT_FILE: &str = "report.md";
pub const CORRECT_FILE: &str = "correct_predictions.jsonl";
pub const INCORRECT_FILE: &str = "incorrect_predictions.jsonl";

const SCHEMA_VERSION: &str = "1.0";

/// Contents of `metrics.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run: Option<RunInfo>,
    pub has_fatal_errors: bool,
    #[serde(flatten)]
    pub metrics: RunMetrics,
}

impl MetricsArtifact {
    pub fn new(run: Option<RunInfo>, records: &[LedgerRecord]) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run,
            has_fatal_errors: records.iter().any(LedgerRecord::is_fatal_error),
            metrics: aggregate(records),
        }
    }
}

/// Paths of the artifacts written by [`write_report`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub metrics: PathBuf,
    pub report: PathBuf,
    pub correct: PathBuf,
    pub incorrect: PathBuf,
}

fn pct(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Render `report.md`.
pub fn render_report_md(artifact: &MetricsArtifact) -> String {
    let m = &artifact.metrics;
    let mut out = String::new();
    out.push_str("# NQMP Report\n\n");

    if let Some(run) = &artifact.run {
        out.push_str("## Run\n");
        out.push_str(&format!(
            "- run id: `{}`\n- client: {}\n- model: {}\n- pairs: {}\n- seed: {}\n- started: {}\n\n",
            run.run_id,
            run.client,
            run.model,
            run.pair_count,
            run.seed.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
            run.created_at.to_rfc3339(),
        ));
    }

    out.push_str("## Accuracy\n");
    out.push_str(&format!(
        "- item accuracy: {} ({}/{})\n- pair joint accuracy: {} ({}/{})\n- errored items: {}\n- unparseable items: {}\n",
        pct(m.item_accuracy),
        m.correct_items,
        m.items,
        pct(m.pair_joint_accuracy),
        m.correct_pairs,
        m.pairs,
        m.errored_items,
        m.unparseable_items,
    ));
    if artifact.has_fatal_errors {
        out.push_str("- **run contains fatal service errors**\n");
    }
    out.push('\n');

    if !m.by_operator.is_empty() {
        out.push_str("## By Operator\n");
        out.push_str("| operator | items | item acc | pairs | pair joint acc |\n");
        out.push_str("|---|---:|---:|---:|---:|\n");
        for (name, op) in &m.by_operator {
            out.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                name,
                op.items,
                pct(op.item_accuracy),
                op.pairs,
                pct(op.pair_joint_accuracy),
            ));
        }
    }
    out
}

fn write_jsonl<'a>(path: &Path, records: impl Iterator<Item = &'a LedgerRecord>) -> Result<()> {
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record).context("serialize record")?;
        buf.push(b'\n');
    }
    let mut file =
        std::fs::File::create(path).with_context(|| format!("create {:?}", path))?;
    file.write_all(&buf)
        .with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Aggregate the run in `run_dir` and write every artifact into `out_dir`.
pub fn write_report(run_dir: &Path, out_dir: &Path) -> Result<(MetricsArtifact, ReportPaths)> {
    let run = FsRunLedger::read_run_info(run_dir)
        .with_context(|| format!("read run info in {:?}", run_dir))?;
    let records = FsRunLedger::read_records(run_dir)
        .with_context(|| format!("read predictions in {:?}", run_dir))?;
    let artifact = MetricsArtifact::new(run, &records);

    std::fs::create_dir_all(out_dir).with_context(|| format!("create {:?}", out_dir))?;
    let paths = ReportPaths {
        metrics: out_dir.join(METRICS_FILE),
        report: out_dir.join(REPORT_FILE),
        correct: out_dir.join(CORRECT_FILE),
        incorrect: out_dir.join(INCORRECT_FILE),
    };

    let json = serde_json::to_string_pretty(&artifact).context("serialize metrics")?;
    std::fs::write(&paths.metrics, json).with_context(|| format!("write {:?}", paths.metrics))?;
    std::fs::write(&paths.report, render_report_md(&artifact))
        .with_context(|| format!("write {:?}", paths.report))?;
    write_jsonl(&paths.correct, records.iter().filter(|r| r.is_correct()))?;
    write_jsonl(&paths.incorrect, records.iter().filter(|r| !r.is_correct()))?;

    tracing::info!(
        event = "report.written",
        out_dir = %out_dir.display(),
        items = artifact.metrics.items,
        item_accuracy = artifact.metrics.item_accuracy,
        pair_joint_accuracy = artifact.metrics.pair_joint_accuracy,
    );
    Ok((artifact, paths))
}
