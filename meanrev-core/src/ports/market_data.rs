use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::PricePoint;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketDataError {
    #[error("no market data for {ticker}")]
    NotFound { ticker: String },

    #[error("rate limited by market data provider")]
    RateLimited,

    #[error("market data unavailable: {0}")]
    Unavailable(String),

    #[error("malformed market data response: {0}")]
    Malformed(String),
}

/// Source of daily closes and latest prices.
pub trait MarketData {
    /// Daily closes strictly before `as_of`, oldest first. Implementations
    /// return at most `window` points.
    fn get_history(
        &self,
        ticker: &str,
        window: usize,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, MarketDataError>;

    fn get_latest_price(&self, ticker: &str) -> Result<f64, MarketDataError>;
}
