use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, Ticker};
use super::order::OrderSide;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    /// Order side that opens a position of this direction.
    pub fn entry_side(self) -> OrderSide {
        match self {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position of this direction.
    pub fn exit_side(self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// Direction opened by a filled entry order on `side`.
    pub fn opened_by(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

/// An open position as tracked locally.
///
/// Quantity, side and entry price are always overwritten from the broker at
/// reconciliation. `entry_timestamp` and `entry_order_id` are local metadata
/// the broker does not keep in a usable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: Ticker,
    pub side: PositionSide,
    /// Absolute share count.
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_order_id: Option<OrderId>,
    /// Synthesized from a broker position with no local record; the entry
    /// timestamp is only the time it was first seen.
    #[serde(default)]
    pub recovered: bool,
}

impl Position {
    /// Whole calendar days held as of `now` (UTC dates).
    ///
    /// Runs are expected during US market hours (13:30 to 20:00 UTC), where
    /// the UTC date and the New York date agree. A run after 20:00 New York
    /// time already sees the next UTC date and counts one day early.
    pub fn holding_days(&self, now: DateTime<Utc>) -> i64 {
        (now.date_naive() - self.entry_timestamp.date_naive()).num_days()
    }

    /// Realized P&L if the whole position were closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.quantity * self.side.sign()
    }
}

/// An open position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub ticker: Ticker,
    pub side: PositionSide,
    /// Absolute share count.
    pub quantity: f64,
    pub avg_entry_price: f64,
}
