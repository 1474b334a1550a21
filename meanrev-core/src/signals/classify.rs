//! Discrete classification of a z-score.
//!
//! Without a position only entries are possible. With a position only
//! exits are possible, and the stop-loss band wins over the exit band.

use serde::{Deserialize, Serialize};

use super::SignalConfig;
use crate::domain::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalClass {
    EntryLong,
    EntryShort,
    Exit,
    StopLoss,
    Hold,
}

impl SignalClass {
    pub fn is_entry(self) -> bool {
        matches!(self, SignalClass::EntryLong | SignalClass::EntryShort)
    }

    /// Position direction an entry classification asks for.
    pub fn entry_side(self) -> Option<PositionSide> {
        match self {
            SignalClass::EntryLong => Some(PositionSide::Long),
            SignalClass::EntryShort => Some(PositionSide::Short),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalClass::EntryLong => "ENTRY_LONG",
            SignalClass::EntryShort => "ENTRY_SHORT",
            SignalClass::Exit => "EXIT",
            SignalClass::StopLoss => "STOP_LOSS",
            SignalClass::Hold => "HOLD",
        }
    }
}

/// Classify `z` given the side of the open position for the ticker, if any.
pub fn classify(z: f64, held: Option<PositionSide>, config: &SignalConfig) -> SignalClass {
    match held {
        None => {
            if z < config.entry_long {
                SignalClass::EntryLong
            } else if z > config.entry_short {
                SignalClass::EntryShort
            } else {
                SignalClass::Hold
            }
        }
        Some(side) => {
            if z.abs() > config.stop_loss {
                return SignalClass::StopLoss;
            }
            let reverted = match side {
                PositionSide::Long => z >= config.exit_band.lower,
                PositionSide::Short => z <= config.exit_band.upper,
            };
            if reverted {
                SignalClass::Exit
            } else {
                SignalClass::Hold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SignalConfig {
        SignalConfig::default()
    }

    #[test]
    fn flat_entries() {
        assert_eq!(classify(-2.0, None, &cfg()), SignalClass::EntryLong);
        assert_eq!(classify(2.0, None, &cfg()), SignalClass::EntryShort);
        assert_eq!(classify(-1.5, None, &cfg()), SignalClass::Hold);
        assert_eq!(classify(1.5, None, &cfg()), SignalClass::Hold);
        assert_eq!(classify(0.0, None, &cfg()), SignalClass::Hold);
    }

    #[test]
    fn flat_never_exits() {
        assert_eq!(classify(-3.5, None, &cfg()), SignalClass::EntryLong);
    }

    #[test]
    fn long_exit_band() {
        let long = Some(PositionSide::Long);
        assert_eq!(classify(-0.1, long, &cfg()), SignalClass::Exit);
        assert_eq!(classify(-0.3, long, &cfg()), SignalClass::Exit);
        assert_eq!(classify(1.0, long, &cfg()), SignalClass::Exit);
        assert_eq!(classify(-0.31, long, &cfg()), SignalClass::Hold);
        assert_eq!(classify(-2.0, long, &cfg()), SignalClass::Hold);
    }

    #[test]
    fn short_exit_band() {
        let short = Some(PositionSide::Short);
        assert_eq!(classify(0.1, short, &cfg()), SignalClass::Exit);
        assert_eq!(classify(0.3, short, &cfg()), SignalClass::Exit);
        assert_eq!(classify(-1.0, short, &cfg()), SignalClass::Exit);
        assert_eq!(classify(0.31, short, &cfg()), SignalClass::Hold);
    }

    #[test]
    fn stop_loss_beats_exit() {
        assert_eq!(
            classify(-3.5, Some(PositionSide::Long), &cfg()),
            SignalClass::StopLoss
        );
        // Far past the stop on the favorable side still reads as STOP_LOSS.
        assert_eq!(
            classify(3.5, Some(PositionSide::Long), &cfg()),
            SignalClass::StopLoss
        );
        assert_eq!(
            classify(3.01, Some(PositionSide::Short), &cfg()),
            SignalClass::StopLoss
        );
        assert_eq!(
            classify(3.0, Some(PositionSide::Short), &cfg()),
            SignalClass::Hold
        );
    }
}
