//! OrderCoordinator: turns signals and state into broker orders.
//!
//! Decisions (`evaluate_exits`, `evaluate_entries`) are pure reads of the
//! working state. Actions (`submit_close`, `submit_entry`, `confirm_fills`,
//! `cancel_stale_entries`) call the broker once per order and update the
//! working state with the result. Nothing is retried within a run.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::lifecycle::OrderState;
use super::risk::{check_risk_gates, CashBudget, RiskGateBlocked, RiskLimits};
use crate::domain::{
    AccountSnapshot, ExitReason, LimitOrderRequest, OrderIntent, PendingOrder, Position,
    PositionSide, RunId, Ticker,
};
use crate::ports::{Broker, BrokerError};
use crate::signals::{Signal, SignalClass};
use crate::state::{FillSource, Settlement, StateError, StateStore, StatusCheck};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("broker call for {ticker} failed: {source}")]
    Broker {
        ticker: Ticker,
        #[source]
        source: BrokerError,
    },

    #[error("${size_usd:.2} buys less than one share of {ticker} at ${price:.2}")]
    BelowOneShare {
        ticker: Ticker,
        size_usd: f64,
        price: f64,
    },

    #[error("invalid price for {ticker}: {price}")]
    InvalidPrice { ticker: Ticker, price: f64 },

    #[error("no open position for {ticker}")]
    NoPosition { ticker: Ticker },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Sizing and exit limits the coordinator works under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    pub position_size_usd: f64,
    pub max_holding_days: i64,
    pub pdt_limit: u32,
}

impl CoordinatorConfig {
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            position_size_usd: self.position_size_usd,
            pdt_limit: self.pdt_limit,
        }
    }
}

/// Close an open position, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseInstruction {
    pub ticker: Ticker,
    pub side: PositionSide,
    pub quantity: f64,
    pub reason: ExitReason,
    pub holding_days: i64,
    pub z_score: Option<f64>,
}

/// A flat ticker whose signal asks for an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryCandidate {
    pub ticker: Ticker,
    pub side: PositionSide,
    pub z_score: f64,
    pub current_price: f64,
}

/// Result of one stale-entry cancel attempt.
#[derive(Debug)]
pub enum CancelOutcome {
    Canceled(PendingOrder),
    /// The cancel failed because the order had already reached a terminal
    /// state; it was settled instead.
    AlreadyTerminal(Settlement),
    /// Cancel failed and the order is still tracked.
    Failed {
        order: PendingOrder,
        error: BrokerError,
    },
}

/// Fill checks for the orders this run created.
#[derive(Debug, Default)]
pub struct FillReport {
    pub checks: Vec<StatusCheck>,
}

impl FillReport {
    pub fn filled(&self) -> impl Iterator<Item = &Settlement> {
        self.settlements().filter(|s| s.is_fill())
    }

    pub fn still_open(&self) -> impl Iterator<Item = &PendingOrder> {
        self.settlements().filter_map(|s| match s {
            Settlement::StillOpen(order) => Some(order),
            _ => None,
        })
    }

    pub fn settlements(&self) -> impl Iterator<Item = &Settlement> {
        self.checks.iter().filter_map(|c| c.outcome.as_ref().ok())
    }
}

/// Exit reason for `position`, if it should close now.
///
/// Precedence: STOP_LOSS, then MAX_HOLD (inclusive at `max_holding_days`),
/// then EXIT_SIGNAL. A missing signal still allows MAX_HOLD.
pub fn exit_reason_for(
    position: &Position,
    signal: Option<&Signal>,
    max_holding_days: i64,
    now: DateTime<Utc>,
) -> Option<ExitReason> {
    let class = signal.map(|s| s.classification);
    if class == Some(SignalClass::StopLoss) {
        return Some(ExitReason::StopLoss);
    }
    if position.holding_days(now) >= max_holding_days {
        return Some(ExitReason::MaxHold);
    }
    if class == Some(SignalClass::Exit) {
        return Some(ExitReason::ExitSignal);
    }
    None
}

fn find_signal<'s>(signals: &'s [Signal], ticker: &str) -> Option<&'s Signal> {
    signals.iter().find(|s| s.ticker == ticker)
}

fn valid_price(ticker: &str, price: f64) -> Result<f64, OrderError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(OrderError::InvalidPrice {
            ticker: ticker.to_string(),
            price,
        })
    }
}

pub struct OrderCoordinator<'a, B: Broker + ?Sized> {
    broker: &'a B,
    config: CoordinatorConfig,
    run_id: RunId,
}

impl<'a, B: Broker + ?Sized> OrderCoordinator<'a, B> {
    pub fn new(broker: &'a B, config: CoordinatorConfig, run_id: RunId) -> Self {
        Self {
            broker,
            config,
            run_id,
        }
    }

    // ── Exits ────────────────────────────────────────────────────────

    /// Close instructions for every open position that should close now.
    /// Positions that already have an open EXIT order are left alone.
    pub fn evaluate_exits(
        &self,
        store: &StateStore,
        signals: &[Signal],
        now: DateTime<Utc>,
    ) -> Vec<CloseInstruction> {
        store
            .positions()
            .filter(|p| store.open_exit_for(&p.ticker).is_none())
            .filter_map(|p| {
                let signal = find_signal(signals, &p.ticker);
                let reason = exit_reason_for(p, signal, self.config.max_holding_days, now)?;
                Some(CloseInstruction {
                    ticker: p.ticker.clone(),
                    side: p.side,
                    quantity: p.quantity,
                    reason,
                    holding_days: p.holding_days(now),
                    z_score: signal.map(|s| s.z_score),
                })
            })
            .collect()
    }

    /// Place a day limit order on the opposite side for the full position.
    pub fn submit_close(
        &self,
        store: &mut StateStore,
        instruction: &CloseInstruction,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> Result<PendingOrder, OrderError> {
        let ticker = &instruction.ticker;
        let price = valid_price(ticker, current_price)?;
        let position = store
            .position(ticker)
            .ok_or_else(|| OrderError::NoPosition {
                ticker: ticker.clone(),
            })?;

        let request =
            LimitOrderRequest::day(ticker.clone(), position.quantity, price, position.side.exit_side());
        let ack = self
            .broker
            .submit_limit_order(&request)
            .map_err(|source| OrderError::Broker {
                ticker: ticker.clone(),
                source,
            })?;

        let mut order = PendingOrder::submitted(&ack, OrderIntent::Exit, &self.run_id, now);
        order.exit_reason = Some(instruction.reason);
        order.z_at_placement = instruction.z_score;
        store.insert_pending(order.clone())?;
        tracing::info!(
            ticker = %ticker,
            order_id = %order.order_id,
            reason = %instruction.reason,
            "exit order submitted"
        );
        Ok(order)
    }

    // ── Entries ──────────────────────────────────────────────────────

    /// Flat tickers whose signal asks for an entry and that have no ENTRY
    /// order working. Keeps the order of `signals`.
    pub fn evaluate_entries(&self, store: &StateStore, signals: &[Signal]) -> Vec<EntryCandidate> {
        signals
            .iter()
            .filter(|s| !store.has_position(&s.ticker))
            .filter(|s| store.open_entry_for(&s.ticker).is_none())
            .filter_map(|s| {
                Some(EntryCandidate {
                    ticker: s.ticker.clone(),
                    side: s.classification.entry_side()?,
                    z_score: s.z_score,
                    current_price: s.current_price,
                })
            })
            .collect()
    }

    pub fn check_risk_gates(
        &self,
        budget: &mut CashBudget,
        account: &AccountSnapshot,
    ) -> Result<(), RiskGateBlocked> {
        check_risk_gates(budget, account, &self.config.risk_limits())
    }

    /// Whole shares affordable with one position size at `price`.
    pub fn entry_quantity(&self, price: f64) -> f64 {
        (self.config.position_size_usd / price).floor()
    }

    /// Place a day limit entry at the candidate's current price.
    pub fn submit_entry(
        &self,
        store: &mut StateStore,
        candidate: &EntryCandidate,
        now: DateTime<Utc>,
    ) -> Result<PendingOrder, OrderError> {
        let ticker = &candidate.ticker;
        let price = valid_price(ticker, candidate.current_price)?;
        let quantity = self.entry_quantity(price);
        if quantity < 1.0 {
            return Err(OrderError::BelowOneShare {
                ticker: ticker.clone(),
                size_usd: self.config.position_size_usd,
                price,
            });
        }
        if store.has_position(ticker) {
            return Err(StateError::PositionExists {
                ticker: ticker.clone(),
            }
            .into());
        }
        if store.open_entry_for(ticker).is_some() {
            return Err(StateError::DuplicateEntry {
                ticker: ticker.clone(),
            }
            .into());
        }

        let request =
            LimitOrderRequest::day(ticker.clone(), quantity, price, candidate.side.entry_side());
        let ack = self
            .broker
            .submit_limit_order(&request)
            .map_err(|source| OrderError::Broker {
                ticker: ticker.clone(),
                source,
            })?;

        let mut order = PendingOrder::submitted(&ack, OrderIntent::Entry, &self.run_id, now);
        order.z_at_placement = Some(candidate.z_score);
        store.insert_pending(order.clone())?;
        tracing::info!(
            ticker = %ticker,
            order_id = %order.order_id,
            quantity,
            "entry order submitted"
        );
        Ok(order)
    }

    // ── Fills ────────────────────────────────────────────────────────

    /// Look up each order created in this run once and settle it. Older
    /// orders wait for the next run's reconciliation.
    pub fn confirm_fills(&self, store: &mut StateStore, now: DateTime<Utc>) -> FillReport {
        let checks = store
            .created_in(&self.run_id)
            .into_iter()
            .map(|order| {
                let outcome = self
                    .broker
                    .get_order_status(&order.order_id)
                    .map(|report| store.settle(order.clone(), &report, now, FillSource::CurrentRun));
                StatusCheck {
                    order_id: order.order_id,
                    ticker: order.ticker,
                    outcome,
                }
            })
            .collect();
        FillReport { checks }
    }

    // ── Stale entries ────────────────────────────────────────────────

    /// Cancel ENTRY orders still working for tickers that already hold a
    /// position, so a position never coexists with an open ENTRY.
    pub fn cancel_stale_entries(&self, store: &mut StateStore, now: DateTime<Utc>) -> Vec<CancelOutcome> {
        let stale: Vec<PendingOrder> = store
            .pending()
            .filter(|o| o.is_entry() && store.has_position(&o.ticker))
            .cloned()
            .collect();

        stale
            .into_iter()
            .map(|order| self.cancel_one(store, order, now))
            .collect()
    }

    fn cancel_one(&self, store: &mut StateStore, order: PendingOrder, now: DateTime<Utc>) -> CancelOutcome {
        let error = match self.broker.cancel_order(&order.order_id) {
            Ok(()) => {
                store.remove_pending(&order.order_id);
                return CancelOutcome::Canceled(order);
            }
            Err(error) => error,
        };

        // A refused cancel usually means the order already finished.
        match self.broker.get_order_status(&order.order_id) {
            Ok(report) if OrderState::from_status(report.status).is_terminal() => {
                CancelOutcome::AlreadyTerminal(store.settle(order, &report, now, FillSource::PriorRun))
            }
            _ => CancelOutcome::Failed { order, error },
        }
    }
}
