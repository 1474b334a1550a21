use thiserror::Error;

use crate::domain::{
    AccountSnapshot, BrokerOrder, BrokerPosition, LimitOrderRequest, OrderId, Ticker,
};

/// Failures surfaced by a broker implementation.
///
/// Timeouts are the implementation's job to enforce; they surface as
/// `Unavailable`. Callers never retry within a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("broker authentication failed: {0}")]
    Unauthenticated(String),

    #[error("rate limited by broker")]
    RateLimited,

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("not found at broker: {0}")]
    NotFound(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("malformed broker response: {0}")]
    Malformed(String),
}

impl BrokerError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, BrokerError::Unauthenticated(_))
    }
}

/// Brokerage execution venue. Every call blocks until it returns or the
/// implementation gives up.
pub trait Broker {
    fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Open orders, optionally restricted to `tickers`.
    fn get_open_orders(&self, tickers: Option<&[Ticker]>) -> Result<Vec<BrokerOrder>, BrokerError>;

    fn submit_limit_order(&self, request: &LimitOrderRequest) -> Result<BrokerOrder, BrokerError>;

    /// Current record for one order. `NotFound` when the broker has no such order.
    fn get_order_status(&self, order_id: &OrderId) -> Result<BrokerOrder, BrokerError>;

    fn cancel_order(&self, order_id: &OrderId) -> Result<(), BrokerError>;
}
