//! Order records: what we ask the broker for, what the broker reports back,
//! and the local `PendingOrder` that links the two across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, RunId, Ticker};
use super::trade::ExitReason;

/// Buy or sell, as the broker sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Why an order was placed. The broker has no notion of this; it is local
/// metadata, inferred best-effort for orders we did not place ourselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderIntent {
    Entry,
    Exit,
}

/// Only day orders are placed: unfilled orders die with the session and the
/// next run re-evaluates from fresh signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
        }
    }
}

/// Order status strings as reported by the broker.
///
/// Anything unrecognized parses to `Unknown` and is treated as still open,
/// which keeps the order tracked until a later run sees a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    New,
    Accepted,
    PendingNew,
    PartiallyFilled,
    Filled,
    DoneForDay,
    Canceled,
    Expired,
    Replaced,
    PendingCancel,
    PendingReplace,
    Rejected,
    Suspended,
    Stopped,
    Held,
    #[serde(other)]
    Unknown,
}

impl BrokerOrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "accepted" => Self::Accepted,
            "pending_new" => Self::PendingNew,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "done_for_day" => Self::DoneForDay,
            "canceled" | "cancelled" => Self::Canceled,
            "expired" => Self::Expired,
            "replaced" => Self::Replaced,
            "pending_cancel" => Self::PendingCancel,
            "pending_replace" => Self::PendingReplace,
            "rejected" => Self::Rejected,
            "suspended" => Self::Suspended,
            "stopped" => Self::Stopped,
            "held" => Self::Held,
            _ => Self::Unknown,
        }
    }

    /// True for every status that is not terminal.
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            Self::Filled | Self::DoneForDay | Self::Canceled | Self::Expired | Self::Replaced | Self::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Accepted => "accepted",
            Self::PendingNew => "pending_new",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::DoneForDay => "done_for_day",
            Self::Canceled => "canceled",
            Self::Expired => "expired",
            Self::Replaced => "replaced",
            Self::PendingCancel => "pending_cancel",
            Self::PendingReplace => "pending_replace",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
            Self::Stopped => "stopped",
            Self::Held => "held",
            Self::Unknown => "unknown",
        }
    }
}

/// A limit order to submit. Always day time-in-force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub ticker: Ticker,
    pub quantity: f64,
    pub limit_price: f64,
    pub side: OrderSide,
    pub time_in_force: TimeInForce,
}

impl LimitOrderRequest {
    /// Day limit order; the limit is rounded to cents.
    pub fn day(ticker: impl Into<Ticker>, quantity: f64, limit_price: f64, side: OrderSide) -> Self {
        Self {
            ticker: ticker.into(),
            quantity,
            limit_price: round_cents(limit_price),
            side,
            time_in_force: TimeInForce::Day,
        }
    }
}

/// An order record as the broker reports it (open-orders listing, status
/// lookup, or submission acknowledgement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub order_id: OrderId,
    pub ticker: Ticker,
    pub side: OrderSide,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub status: BrokerOrderStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_qty: f64,
    pub filled_avg_price: Option<f64>,
    pub filled_at: Option<DateTime<Utc>>,
}

/// A locally tracked order awaiting a terminal broker status.
///
/// Lives from submission until the broker reports filled / canceled /
/// rejected / expired. Persisted in the global pending store between runs
/// and in each run's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: OrderId,
    pub ticker: Ticker,
    pub side: OrderSide,
    pub intent: OrderIntent,
    pub submitted_timestamp: DateTime<Utc>,
    pub limit_price: Option<f64>,
    pub quantity: f64,
    /// Last status the broker reported for this order.
    pub status: BrokerOrderStatus,
    /// Z-score of the ticker when the order was placed, when known.
    #[serde(default)]
    pub z_at_placement: Option<f64>,
    /// Close reason, for EXIT orders placed by this process.
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    /// Run that created the order. `None` for orders adopted from the broker.
    #[serde(default)]
    pub run_id: Option<RunId>,
}

impl PendingOrder {
    /// Build the local record for an order this process just submitted.
    pub fn submitted(
        ack: &BrokerOrder,
        intent: OrderIntent,
        run_id: &RunId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: ack.order_id.clone(),
            ticker: ack.ticker.clone(),
            side: ack.side,
            intent,
            submitted_timestamp: ack.submitted_at.unwrap_or(now),
            limit_price: ack.limit_price,
            quantity: ack.quantity,
            status: ack.status,
            z_at_placement: None,
            exit_reason: None,
            run_id: Some(run_id.clone()),
        }
    }

    pub fn is_entry(&self) -> bool {
        self.intent == OrderIntent::Entry
    }

    pub fn is_exit(&self) -> bool {
        self.intent == OrderIntent::Exit
    }

    pub fn created_in(&self, run_id: &RunId) -> bool {
        self.run_id.as_ref() == Some(run_id)
    }
}

pub(crate) fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
