use std::io;

use thiserror::Error;

use crate::domain::{RunId, RunRecord};
use crate::journal::ActionLog;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("trade ledger CSV error: {0}")]
    Csv(String),
}

/// Durable sink for completed trades and the per-run action log.
///
/// Records are append-only: nothing written is ever rewritten.
pub trait Ledger {
    fn append_records(&mut self, records: &[RunRecord]) -> Result<(), LedgerError>;

    fn write_action_log(&mut self, run_id: &RunId, log: &ActionLog) -> Result<(), LedgerError>;
}
