use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One close observation for a ticker. An ordered slice of these is a
/// history window, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }
}
