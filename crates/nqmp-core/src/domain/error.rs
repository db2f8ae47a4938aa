//! Domain-level error taxonomy for NQMP.

use crate::ledger::LedgerError;

/// NQMP domain errors.
#[derive(Debug, thiserror::Error)]
pub enum NqmpError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("degenerate context: {operator} could not produce a minimal pair for {pair_id} after {attempts} attempts")]
    DegenerateContext {
        pair_id: String,
        operator: String,
        attempts: u32,
    },

    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for NQMP domain operations.
pub type Result<T> = std::result::Result<T, NqmpError>;
