use serde::{Deserialize, Serialize};

/// Account state as reported by the broker at the start of a run.
///
/// `day_trade_count` is the broker's rolling counter; it is never derived
/// locally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub cash: f64,
    pub day_trade_count: u32,
    pub is_pdt_restricted: bool,
}

impl AccountSnapshot {
    /// Stand-in used when the account could not be read: no cash, so every
    /// entry is blocked while exits still proceed.
    pub fn unavailable() -> Self {
        Self {
            cash: 0.0,
            day_trade_count: 0,
            is_pdt_restricted: false,
        }
    }
}
