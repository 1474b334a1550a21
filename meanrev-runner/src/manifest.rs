//! Run summary counters and the manifest written into each run snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use meanrev_core::domain::RunId;
use meanrev_core::orders::BlockReason;

/// Current schema version for `manifest.json`.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Counters for one daily run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub tickers_evaluated: usize,
    pub tickers_skipped: usize,
    pub closes_submitted: usize,
    pub entries_submitted: usize,
    pub entries_blocked_cash: usize,
    pub entries_blocked_pdt: usize,
    pub fills_confirmed: usize,
    pub trades_recorded: usize,
    pub recovered_positions: usize,
    pub adopted_orders: usize,
    /// False when the account could not be read and entries were disabled.
    pub account_available: bool,
    pub open_positions: usize,
    pub pending_orders: usize,
}

impl RunSummary {
    pub fn record_block(&mut self, reason: BlockReason) {
        match reason {
            BlockReason::Cash => self.entries_blocked_cash += 1,
            BlockReason::Pdt => self.entries_blocked_pdt += 1,
        }
    }

    pub fn entries_blocked(&self) -> usize {
        self.entries_blocked_cash + self.entries_blocked_pdt
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tickers:   {} evaluated, {} skipped",
            self.tickers_evaluated, self.tickers_skipped
        )?;
        writeln!(
            f,
            "orders:    {} closes, {} entries submitted",
            self.closes_submitted, self.entries_submitted
        )?;
        writeln!(
            f,
            "blocked:   {} (cash {}, pdt {})",
            self.entries_blocked(),
            self.entries_blocked_cash,
            self.entries_blocked_pdt
        )?;
        writeln!(
            f,
            "fills:     {} confirmed, {} trades recorded",
            self.fills_confirmed, self.trades_recorded
        )?;
        writeln!(
            f,
            "reconcile: {} recovered positions, {} adopted orders",
            self.recovered_positions, self.adopted_orders
        )?;
        write!(
            f,
            "state:     {} open positions, {} pending orders{}",
            self.open_positions,
            self.pending_orders,
            if self.account_available {
                ""
            } else {
                " (account unavailable, exits only)"
            }
        )
    }
}

/// `runs/<run_id>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// BLAKE3 fingerprint of the config the run used.
    pub config_fingerprint: String,
    pub paper: bool,
    pub summary: RunSummary,
}

fn default_schema_version() -> u32 {
    MANIFEST_SCHEMA_VERSION
}

impl RunManifest {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
