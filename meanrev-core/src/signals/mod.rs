//! SignalEngine: price history in, z-score and classification out.
//!
//! `compute_signal` is pure. The statistics window is the most recent
//! `window - 1` historical closes with the live price appended as the newest
//! observation, so the signal reflects today's price rather than yesterday's
//! close.
//!
//! A ticker whose history is too short, contains non-finite closes, or has
//! no spread yields `SignalError::InsufficientData`. Callers treat that as
//! HOLD for the run and move on.

pub mod classify;
pub mod zscore;

pub use classify::{classify, SignalClass};
pub use zscore::WindowStats;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{PositionSide, PricePoint, Ticker};

/// Closed interval around zero inside which an open position counts as
/// reverted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ExitBand {
    fn default() -> Self {
        Self {
            lower: -0.3,
            upper: 0.3,
        }
    }
}

/// Window length and classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub window: usize,
    /// Flat and `z` strictly below this opens a long.
    pub entry_long: f64,
    /// Flat and `z` strictly above this opens a short.
    pub entry_short: f64,
    pub exit_band: ExitBand,
    /// Open and `|z|` strictly above this closes at STOP_LOSS.
    pub stop_loss: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window: 30,
            entry_long: -1.5,
            entry_short: 1.5,
            exit_band: ExitBand::default(),
            stop_loss: 3.0,
        }
    }
}

/// One ticker's signal for the current run. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub ticker: Ticker,
    pub current_price: f64,
    pub moving_average: f64,
    pub std_dev: f64,
    pub z_score: f64,
    pub classification: SignalClass,
    /// Number of observations in the statistics window.
    pub window: usize,
    /// Timestamp of the newest historical close that went into the window.
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsufficientData {
    TooShort { needed: usize, got: usize },
    NonFiniteClose,
    ZeroVariance,
}

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsufficientData::TooShort { needed, got } => {
                write!(f, "need {needed} closes, got {got}")
            }
            InsufficientData::NonFiniteClose => f.write_str("non-finite close in window"),
            InsufficientData::ZeroVariance => f.write_str("zero standard deviation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("insufficient data for {ticker}: {reason}")]
    InsufficientData {
        ticker: Ticker,
        reason: InsufficientData,
    },

    #[error("invalid current price for {ticker}: {price}")]
    InvalidPrice { ticker: Ticker, price: f64 },
}

/// Compute the z-score signal for `ticker`.
///
/// `history` is ordered oldest first and must hold at least `config.window`
/// points. `held` is the side of the open position for the ticker, if any;
/// it selects between entry and exit classification.
pub fn compute_signal(
    ticker: &str,
    history: &[PricePoint],
    current_price: f64,
    held: Option<PositionSide>,
    config: &SignalConfig,
) -> Result<Signal, SignalError> {
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(SignalError::InvalidPrice {
            ticker: ticker.to_string(),
            price: current_price,
        });
    }

    let insufficient = |reason| SignalError::InsufficientData {
        ticker: ticker.to_string(),
        reason,
    };

    let needed = config.window.max(2);
    let last = match history.last() {
        Some(last) if history.len() >= needed => last,
        _ => {
            return Err(insufficient(InsufficientData::TooShort {
                needed,
                got: history.len(),
            }))
        }
    };

    let mut closes: Vec<f64> = history[history.len() - (needed - 1)..]
        .iter()
        .map(|p| p.close)
        .collect();
    closes.push(current_price);

    let stats =
        WindowStats::from_closes(&closes).ok_or_else(|| insufficient(InsufficientData::NonFiniteClose))?;
    let z_score = stats
        .z(current_price)
        .ok_or_else(|| insufficient(InsufficientData::ZeroVariance))?;

    Ok(Signal {
        ticker: ticker.to_string(),
        current_price,
        moving_average: stats.mean,
        std_dev: stats.std_dev,
        z_score,
        classification: classify(z_score, held, config),
        window: stats.len,
        as_of: last.timestamp,
    })
}
