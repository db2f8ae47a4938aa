//! Structured observability hooks for generation and run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span (`run_span`)
//! - Emission functions for generation, per-item and run-level events
//!
//! Events are emitted at `info!` level unless noted (filter via `RUST_LOG`).

use tracing::{debug, info, warn};

/// Span tagging every event of one run with its `run_id`.
///
/// Attach it with `tracing::Instrument` so it follows the run future across
/// awaits.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("nqmp.run", run_id = %run_id)
}

/// Emit event: dataset generated.
pub fn emit_dataset_generated(seed: u64, pair_count: usize, item_count: usize, resamples: u64) {
    info!(
        event = "dataset.generated",
        seed = seed,
        pair_count = pair_count,
        item_count = item_count,
        resamples = resamples,
    );
}

/// Emit event: run started.
pub fn emit_run_started(
    run_id: &str,
    client: &str,
    model: &str,
    total_items: usize,
    resumed: usize,
) {
    info!(
        event = "run.started",
        run_id = %run_id,
        client = %client,
        model = %model,
        total_items = total_items,
        already_recorded = resumed,
    );
}

/// Emit event: item skipped because the ledger already holds it (debug level).
pub fn emit_item_skipped(item_id: &str) {
    debug!(event = "item.skipped", item_id = %item_id);
}

/// Emit event: transient failure, retrying after `delay_ms` (warning level).
pub fn emit_call_retry(item_id: &str, attempt: u32, code: Option<u16>, delay_ms: u64, error: &str) {
    warn!(
        event = "call.retry",
        item_id = %item_id,
        attempt = attempt,
        code = ?code,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: item graded.
pub fn emit_item_graded(
    item_id: &str,
    operator: &str,
    correct: bool,
    attempts: u32,
    latency_ms: u64,
) {
    info!(
        event = "item.graded",
        item_id = %item_id,
        operator = %operator,
        correct = correct,
        attempts = attempts,
        latency_ms = latency_ms,
    );
}

/// Emit event: item ended as an `llm_error` (warning level).
pub fn emit_item_errored(item_id: &str, class: &str, code: Option<u16>, error: &str) {
    warn!(
        event = "item.errored",
        item_id = %item_id,
        class = %class,
        code = ?code,
        error = %error,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    graded: usize,
    errored: usize,
    skipped: usize,
    has_fatal_errors: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        graded = graded,
        errored = errored,
        skipped = skipped,
        has_fatal_errors = has_fatal_errors,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _entered = span.enter();
        emit_item_skipped("0123456789abcdef");
    }
}
