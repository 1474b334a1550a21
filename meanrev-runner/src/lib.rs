//! MeanRev Runner: daily run orchestration, configuration, the trade ledger
//! and the Alpaca adapter.
//!
//! This crate builds on `meanrev-core` to provide:
//! - `run_daily_cycle()`: reconcile, exits, entries, fills, persist
//! - TOML configuration with defaults and a BLAKE3 fingerprint
//! - CSV trade ledger and per-run action logs
//! - Blocking Alpaca REST client implementing `Broker` and `MarketData`

pub mod alpaca;
pub mod config;
pub mod ledger;
pub mod manifest;
pub mod orchestrator;

pub use alpaca::{AlpacaClient, AlpacaEndpoints, AlpacaError};
pub use config::{BotConfig, ConfigError, Credentials};
pub use ledger::{read_trades, CsvLedger, TradeRow, TradeSummary};
pub use manifest::{RunManifest, RunSummary};
pub use orchestrator::{run_daily_cycle, RunError, RunOutcome};
