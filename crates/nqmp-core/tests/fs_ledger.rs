use std::fs::OpenOptions;
use std::io::Write;

use chrono::Utc;
use nqmp_core::grader::NormalizedAnswer;
use nqmp_core::ledger::fs::PREDICTIONS_FILE;
use nqmp_core::ledger::{ErrorRecord, GradedRecord};
use nqmp_core::{
    Answer, AnswerDomain, ErrorClass, FsRunLedger, LedgerError, LedgerRecord, OperatorKind,
    RunInfo, RunLedger, Variant,
};

fn run_info(model: &str) -> RunInfo {
    RunInfo::new(Some(42), 100, "digest-1", "echo", model)
}

fn graded(item_id: &str, variant: Variant, correct: bool) -> LedgerRecord {
    LedgerRecord::Graded(GradedRecord {
        item_id: item_id.to_string(),
        pair_id: "pair_0003".to_string(),
        operator: OperatorKind::AtLeastAtMost,
        variant,
        question: "Are there at least 2 red items?".to_string(),
        raw_response: "Yes".to_string(),
        normalized: NormalizedAnswer::Boolean(true),
        gold: Answer::Boolean(correct),
        answer_type: AnswerDomain::Boolean,
        correct,
        attempts: 1,
        latency_ms: 12,
        recorded_at: Utc::now(),
        pair_correct: None,
    })
}

fn fatal(item_id: &str) -> LedgerRecord {
    LedgerRecord::LlmError(ErrorRecord {
        item_id: item_id.to_string(),
        pair_id: "pair_0004".to_string(),
        operator: OperatorKind::Negation,
        variant: Variant::A,
        question: "List ids with value ok.".to_string(),
        error: "fatal service error (401): unauthorized".to_string(),
        class: ErrorClass::Fatal,
        code: Some(401),
        attempts: 1,
        recorded_at: Utc::now(),
    })
}

#[test]
fn reopen_with_resume_restores_records() {
    let dir = tempfile::tempdir().unwrap();
    let info = run_info("m");
    {
        let mut ledger = FsRunLedger::open(dir.path(), &info, false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
        ledger.append(fatal("item-b")).unwrap();
    }

    let ledger = FsRunLedger::open(dir.path(), &run_info("m"), true).unwrap();
    assert_eq!(ledger.records().len(), 2);
    assert!(ledger.contains("item-a"));
    assert!(ledger.contains("item-b"));
    assert!(ledger.has_fatal_errors());
    // Identity comes from disk, not from the new request.
    assert_eq!(ledger.info().run_id, info.run_id);
}

#[test]
fn torn_tail_is_truncated_on_open() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
    }
    let path = dir.path().join(PREDICTIONS_FILE);
    let intact = std::fs::read(&path).unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"outcome":"graded","item_id":"item-"#).unwrap();
    drop(file);

    let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), true).unwrap();
    assert_eq!(ledger.records().len(), 1);
    assert_eq!(std::fs::read(&path).unwrap(), intact);

    ledger.append(graded("item-b", Variant::B, true)).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn malformed_complete_line_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
    }
    let path = dir.path().join(PREDICTIONS_FILE);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"not json\n").unwrap();
    drop(file);

    match FsRunLedger::open(dir.path(), &run_info("m"), true) {
        Err(LedgerError::Corrupt { line, .. }) => assert_eq!(line, 2),
        Err(other) => panic!("expected Corrupt, got {other:?}"),
        Ok(_) => panic!("expected Corrupt, got a ledger"),
    }
}

#[test]
fn incompatible_resume_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    FsRunLedger::open(dir.path(), &run_info("model-a"), false).unwrap();

    match FsRunLedger::open(dir.path(), &run_info("model-b"), true) {
        Err(LedgerError::IncompatibleResume { field, .. }) => assert_eq!(field, "model"),
        Err(other) => panic!("expected IncompatibleResume, got {other:?}"),
        Ok(_) => panic!("expected IncompatibleResume, got a ledger"),
    }
}

#[test]
fn fresh_open_refuses_existing_records() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
    }
    assert!(matches!(
        FsRunLedger::open(dir.path(), &run_info("m"), false),
        Err(LedgerError::AlreadyInitialized)
    ));
}

#[test]
fn resume_without_prior_run_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let info = run_info("m");
    let ledger = FsRunLedger::open(dir.path(), &info, true).unwrap();
    assert!(ledger.records().is_empty());
    assert_eq!(ledger.info(), &info);
    assert!(FsRunLedger::read_run_info(dir.path()).unwrap().is_some());
}

#[test]
fn duplicate_line_on_disk_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
    }
    let path = dir.path().join(PREDICTIONS_FILE);
    let line = std::fs::read(&path).unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&line).unwrap();
    drop(file);

    assert!(matches!(
        FsRunLedger::read_records(dir.path()),
        Err(LedgerError::Corrupt { line: 2, .. })
    ));
}

#[test]
fn check_open_refuses_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!FsRunLedger::check_open(dir.path(), &run_info("m"), true).unwrap());
    assert!(FsRunLedger::read_run_info(dir.path()).unwrap().is_none());

    {
        let mut ledger = FsRunLedger::open(dir.path(), &run_info("m"), false).unwrap();
        ledger.append(graded("item-a", Variant::A, true)).unwrap();
    }
    let recorded = std::fs::read(dir.path().join("run_info.json")).unwrap();

    assert!(FsRunLedger::check_open(dir.path(), &run_info("m"), true).unwrap());
    assert!(matches!(
        FsRunLedger::check_open(dir.path(), &run_info("m"), false),
        Err(LedgerError::AlreadyInitialized)
    ));
    assert!(matches!(
        FsRunLedger::check_open(dir.path(), &run_info("other"), true),
        Err(LedgerError::IncompatibleResume { .. })
    ));
    assert_eq!(std::fs::read(dir.path().join("run_info.json")).unwrap(), recorded);
}
