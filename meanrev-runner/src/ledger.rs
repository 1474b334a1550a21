//! File-backed ledger: the append-only `trades.csv` and each run's
//! `actions.log`.
//!
//! Column order is fixed: ticker, side, quantity, entry_price, exit_price,
//! entry_time, exit_time, pnl, exit_reason. Prices and P&L are written with
//! two decimals, times as RFC 3339. The header is written only when the file
//! is new or empty.

use chrono::SecondsFormat;
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use meanrev_core::domain::{RunId, RunRecord};
use meanrev_core::journal::ActionLog;
use meanrev_core::ports::{Ledger, LedgerError};
use meanrev_core::state::SnapshotStore;

pub const TRADE_COLUMNS: [&str; 9] = [
    "ticker",
    "side",
    "quantity",
    "entry_price",
    "exit_price",
    "entry_time",
    "exit_time",
    "pnl",
    "exit_reason",
];

const ACTIONS_FILE: &str = "actions.log";

fn csv_err(e: csv::Error) -> LedgerError {
    LedgerError::Csv(e.to_string())
}

/// `trades.csv` plus per-run action logs under the state directory.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    trades_csv: PathBuf,
    snapshots: SnapshotStore,
}

impl CsvLedger {
    pub fn new(trades_csv: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            trades_csv: trades_csv.into(),
            snapshots: SnapshotStore::new(state_dir),
        }
    }

    pub fn action_log_path(&self, run_id: &RunId) -> PathBuf {
        self.snapshots.run_dir(run_id).join(ACTIONS_FILE)
    }
}

fn record_row(r: &RunRecord) -> [String; 9] {
    [
        r.ticker.clone(),
        r.side.as_str().to_string(),
        format!("{}", r.quantity),
        format!("{:.2}", r.entry_price),
        format!("{:.2}", r.exit_price),
        r.entry_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        r.exit_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        format!("{:.2}", r.pnl),
        r.exit_reason.map(|e| e.as_str().to_string()).unwrap_or_default(),
    ]
}

impl Ledger for CsvLedger {
    fn append_records(&mut self, records: &[RunRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.trades_csv.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let needs_header = fs::metadata(&self.trades_csv).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.trades_csv)?;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            wtr.write_record(TRADE_COLUMNS).map_err(csv_err)?;
        }
        for record in records {
            wtr.write_record(record_row(record)).map_err(csv_err)?;
        }
        wtr.flush()?;
        tracing::info!(count = records.len(), path = %self.trades_csv.display(), "trade records appended");
        Ok(())
    }

    fn write_action_log(&mut self, run_id: &RunId, log: &ActionLog) -> Result<(), LedgerError> {
        let path = self.action_log_path(run_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, log.render())?;
        Ok(())
    }
}

// ── Reading the ledger back ──────────────────────────────────────────

/// One row of `trades.csv` as written by `CsvLedger`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeRow {
    pub ticker: String,
    pub side: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: String,
    pub exit_time: String,
    pub pnl: f64,
    #[serde(default)]
    pub exit_reason: String,
}

/// Read every row of a trade ledger. A missing file reads as empty.
pub fn read_trades(path: &Path) -> Result<Vec<TradeRow>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut rdr = csv::Reader::from_path(path).map_err(csv_err)?;
    rdr.deserialize().map(|row| row.map_err(csv_err)).collect()
}

/// Aggregate figures over a set of completed trades.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TradeSummary {
    pub count: usize,
    pub winners: usize,
    pub total_pnl: f64,
}

impl TradeSummary {
    pub fn from_rows(rows: &[TradeRow]) -> Self {
        Self {
            count: rows.len(),
            winners: rows.iter().filter(|r| r.pnl > 0.0).count(),
            total_pnl: rows.iter().map(|r| r.pnl).sum(),
        }
    }

    /// Fraction of trades with positive P&L; zero when there are none.
    pub fn win_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.winners as f64 / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use meanrev_core::domain::{ExitReason, PositionSide};

    fn record(ticker: &str, entry: f64, exit: f64, reason: Option<ExitReason>) -> RunRecord {
        RunRecord {
            ticker: ticker.into(),
            side: PositionSide::Long,
            quantity: 1.0,
            entry_price: entry,
            exit_price: exit,
            entry_time: Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap(),
            exit_time: Utc.with_ymd_and_hms(2024, 5, 3, 14, 0, 0).unwrap(),
            pnl: exit - entry,
            exit_reason: reason,
        }
    }

    #[test]
    fn header_written_once_and_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let mut ledger = CsvLedger::new(&path, dir.path());

        ledger
            .append_records(&[record("MSFT", 101.23, 105.0, Some(ExitReason::ExitSignal))])
            .unwrap();
        ledger.append_records(&[record("AAPL", 100.0, 98.5, None)]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "ticker,side,quantity,entry_price,exit_price,entry_time,exit_time,pnl,exit_reason"
        );
        assert_eq!(
            lines[1],
            "MSFT,LONG,1,101.23,105.00,2024-05-01T14:00:00Z,2024-05-03T14:00:00Z,3.77,EXIT_SIGNAL"
        );
        assert!(lines[2].starts_with("AAPL,LONG,1,100.00,98.50,"));
        assert!(lines[2].ends_with(",-1.50,"));
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let mut ledger = CsvLedger::new(&path, dir.path());
        ledger.append_records(&[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn read_back_and_summarise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let mut ledger = CsvLedger::new(&path, dir.path());
        ledger
            .append_records(&[
                record("MSFT", 100.0, 104.0, Some(ExitReason::ExitSignal)),
                record("AAPL", 100.0, 99.0, Some(ExitReason::StopLoss)),
                record("KO", 60.0, 61.0, None),
            ])
            .unwrap();

        let rows = read_trades(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].exit_reason, "STOP_LOSS");
        assert_eq!(rows[2].exit_reason, "");

        let summary = TradeSummary::from_rows(&rows);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.winners, 2);
        assert!((summary.total_pnl - 4.0).abs() < 1e-9);
        assert!((summary.win_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_ledger_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_trades(&dir.path().join("nope.csv")).unwrap().is_empty());
        assert_eq!(TradeSummary::from_rows(&[]).win_rate(), 0.0);
    }

    #[test]
    fn action_log_lands_in_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = CsvLedger::new(dir.path().join("trades.csv"), dir.path());
        let run_id = RunId("20240601T140000Z".into());
        let mut log = ActionLog::new();
        log.info(Some("AAPL"), "entry order submitted");

        ledger.write_action_log(&run_id, &log).unwrap();

        let path = dir.path().join("runs").join("20240601T140000Z").join("actions.log");
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("AAPL: entry order submitted"));
    }
}
