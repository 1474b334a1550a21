//! RunRecord: one completed round trip, written once to the trade ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::Ticker;
use super::position::{Position, PositionSide};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    MaxHold,
    ExitSignal,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::MaxHold => "MAX_HOLD",
            ExitReason::ExitSignal => "EXIT_SIGNAL",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed (filled) trade: entry → exit.
///
/// Field order is the ledger's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub ticker: Ticker,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    /// `None` when the exit order was adopted from the broker rather than
    /// placed by this process.
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
}

impl RunRecord {
    /// Close `position` at `exit_price`.
    pub fn close(
        position: &Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_reason: Option<ExitReason>,
    ) -> Self {
        Self {
            ticker: position.ticker.clone(),
            side: position.side,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            entry_time: position.entry_timestamp,
            exit_time,
            pnl: position.pnl_at(exit_price),
            exit_reason,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}
