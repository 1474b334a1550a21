//! Collaborator interfaces the core consumes or produces.
//!
//! - `Broker`: execution venue: account, positions, orders
//! - `MarketData`: daily closes and the latest trade price
//! - `Ledger`: durable trade ledger and per-run action log
//!
//! The core never talks to the network itself; the runner supplies real
//! implementations and tests supply scripted fakes.

pub mod broker;
pub mod ledger;
pub mod market_data;

pub use broker::{Broker, BrokerError};
pub use ledger::{Ledger, LedgerError};
pub use market_data::{MarketData, MarketDataError};
