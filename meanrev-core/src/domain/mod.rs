//! Domain types for the daily mean-reversion job.
//!
//! Everything here is plain data: positions, pending orders, broker records,
//! completed-trade records and the account snapshot. Behavior that needs a
//! broker or a file lives in `state` and `orders`.

pub mod account;
pub mod ids;
pub mod order;
pub mod position;
pub mod price;
pub mod trade;

pub use account::AccountSnapshot;
pub use ids::{OrderId, RunId, Ticker};
pub use order::{
    BrokerOrder, BrokerOrderStatus, LimitOrderRequest, OrderIntent, OrderSide, PendingOrder,
    TimeInForce,
};
pub use position::{BrokerPosition, Position, PositionSide};
pub use price::PricePoint;
pub use trade::{ExitReason, RunRecord};
