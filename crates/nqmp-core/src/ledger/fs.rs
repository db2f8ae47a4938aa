use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use super::{CallAttempt, LedgerError, LedgerRecord, LedgerResult, RunInfo, RunLedger};

pub const RUN_INFO_FILE: &str = "run_info.json";
pub const PREDICTIONS_FILE: &str = "predictions.jsonl";
pub const RUN_LOG_FILE: &str = "run.log";

/// Filesystem-backed run ledger.
///
/// Layout inside the output directory:
/// - `run_info.json`: run identity, written once via temp file + rename
/// - `predictions.jsonl`: one terminal record per line, fsynced per append
/// - `run.log`: one line per client call attempt
pub struct FsRunLedger {
    dir: PathBuf,
    info: RunInfo,
    predictions: File,
    run_log: File,
    records: Vec<LedgerRecord>,
    index: HashSet<String>,
}

impl FsRunLedger {
    /// Read `run_info.json` from `dir`, if present.
    pub fn read_run_info(dir: &Path) -> LedgerResult<Option<RunInfo>> {
        let path = dir.join(RUN_INFO_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(path)?)?))
    }

    /// `false` when `dir` holds no prior run, `true` when its identity matches
    /// `requested`, `IncompatibleResume` otherwise.
    pub fn is_resumable(dir: &Path, requested: &RunInfo) -> LedgerResult<bool> {
        match Self::read_run_info(dir)? {
            None => Ok(false),
            Some(recorded) => {
                recorded.check_compatible(requested)?;
                Ok(true)
            }
        }
    }

    /// Run the checks `open` performs, without touching the directory.
    ///
    /// Returns whether `open` would continue a prior run.
    pub fn check_open(dir: &Path, requested: &RunInfo, resume: bool) -> LedgerResult<bool> {
        if resume && Self::is_resumable(dir, requested)? {
            return Ok(true);
        }
        if has_records(&dir.join(PREDICTIONS_FILE))? {
            return Err(LedgerError::AlreadyInitialized);
        }
        Ok(false)
    }

    /// Open the ledger in `dir`.
    ///
    /// A fresh open refuses a directory that already holds records. With
    /// `resume`, a compatible prior run is loaded and continued; a directory
    /// without prior run info starts fresh.
    pub fn open(dir: impl AsRef<Path>, requested: &RunInfo, resume: bool) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let info = if Self::check_open(&dir, requested, resume)? {
            Self::read_run_info(&dir)?.unwrap_or_else(|| requested.clone())
        } else {
            write_run_info(&dir, requested)?;
            requested.clone()
        };

        let predictions_path = dir.join(PREDICTIONS_FILE);
        let records = load_records(&predictions_path)?;
        let index = records
            .iter()
            .map(|r| r.item_id().to_string())
            .collect::<HashSet<_>>();
        if resume {
            info!(
                event = "ledger.loaded",
                run_id = %info.run_id,
                records = records.len(),
            );
        }

        let predictions = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&predictions_path)?;
        let run_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(RUN_LOG_FILE))?;

        Ok(Self {
            dir,
            info,
            predictions,
            run_log,
            records,
            index,
        })
    }

    /// Committed records of the run in `dir`, without opening it for writes.
    pub fn read_records(dir: &Path) -> LedgerResult<Vec<LedgerRecord>> {
        load_records(&dir.join(PREDICTIONS_FILE))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identity of the run this ledger belongs to.
    pub fn info(&self) -> &RunInfo {
        &self.info
    }
}

impl RunLedger for FsRunLedger {
    fn contains(&self, item_id: &str) -> bool {
        self.index.contains(item_id)
    }

    fn append(&mut self, record: LedgerRecord) -> LedgerResult<()> {
        if self.index.contains(record.item_id()) {
            return Err(LedgerError::DuplicateItem(record.item_id().to_string()));
        }
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.predictions.write_all(&line)?;
        self.predictions.sync_data()?;

        self.index.insert(record.item_id().to_string());
        self.records.push(record);
        Ok(())
    }

    fn log_attempt(&mut self, attempt: &CallAttempt) -> LedgerResult<()> {
        let mut line = serde_json::to_vec(attempt)?;
        line.push(b'\n');
        self.run_log.write_all(&line)?;
        self.run_log.flush()?;
        Ok(())
    }

    fn records(&self) -> &[LedgerRecord] {
        &self.records
    }
}

fn has_records(path: &Path) -> LedgerResult<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_run_info(dir: &Path, info: &RunInfo) -> LedgerResult<()> {
    let mut bytes = serde_json::to_vec_pretty(info)?;
    bytes.push(b'\n');
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(RUN_INFO_FILE)).map_err(|e| e.error)?;
    Ok(())
}

/// Parse committed records, truncating a torn trailing line.
fn load_records(path: &Path) -> LedgerResult<Vec<LedgerRecord>> {
    let mut bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    if !bytes.is_empty() && !bytes.ends_with(b"\n") {
        let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        warn!(
            event = "ledger.torn_tail",
            path = %path.display(),
            dropped_bytes = bytes.len() - keep,
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(keep as u64)?;
        file.sync_all()?;
        bytes.truncate(keep);
    }

    let text = String::from_utf8(bytes).map_err(|e| LedgerError::Corrupt {
        line: 0,
        reason: e.to_string(),
    })?;

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: LedgerRecord =
            serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
                line: idx + 1,
                reason: e.to_string(),
            })?;
        if !seen.insert(record.item_id().to_string()) {
            return Err(LedgerError::Corrupt {
                line: idx + 1,
                reason: format!("duplicate item {}", record.item_id()),
            });
        }
        records.push(record);
    }
    Ok(records)
}
