//! In-memory run ledger (testing only).

use std::collections::HashSet;

use super::{CallAttempt, LedgerError, LedgerRecord, LedgerResult, RunLedger};

/// Ledger that keeps records and call attempts in memory.
#[derive(Debug, Default)]
pub struct MemoryRunLedger {
    records: Vec<LedgerRecord>,
    index: HashSet<String>,
    attempts: Vec<CallAttempt>,
}

impl MemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call attempts logged so far.
    pub fn attempts(&self) -> &[CallAttempt] {
        &self.attempts
    }
}

impl RunLedger for MemoryRunLedger {
    fn contains(&self, item_id: &str) -> bool {
        self.index.contains(item_id)
    }

    fn append(&mut self, record: LedgerRecord) -> LedgerResult<()> {
        if !self.index.insert(record.item_id().to_string()) {
            return Err(LedgerError::DuplicateItem(record.item_id().to_string()));
        }
        self.records.push(record);
        Ok(())
    }

    fn log_attempt(&mut self, attempt: &CallAttempt) -> LedgerResult<()> {
        self.attempts.push(attempt.clone());
        Ok(())
    }

    fn records(&self) -> &[LedgerRecord] {
        &self.records
    }
}
