//! Working state for one run: positions and pending orders keyed for
//! uniqueness, plus the settlement rules that turn a terminal broker report
//! into a position, a trade record, or nothing.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::reconcile::Reconciliation;
use super::StateError;
use crate::domain::{
    BrokerOrder, OrderId, OrderIntent, PendingOrder, Position, PositionSide, RunId, RunRecord,
    Ticker,
};
use crate::orders::lifecycle::{InvalidTransition, OrderState};
use crate::ports::{Broker, BrokerError};

/// Where a fill report comes from. Fills of this run's own orders open
/// positions unconditionally; fills discovered for earlier runs' orders
/// only enrich what the broker already reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillSource {
    CurrentRun,
    PriorRun,
}

/// Outcome of applying one broker report to a pending order.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Still working at the broker; status refreshed and kept.
    StillOpen(PendingOrder),
    /// ENTRY fill opened (or enriched) the ticker's position.
    Opened {
        order: PendingOrder,
        position: Position,
    },
    /// EXIT fill closed the position.
    Closed {
        order: PendingOrder,
        record: RunRecord,
    },
    /// Canceled, rejected or expired. Nothing else changes.
    Retired {
        order: PendingOrder,
        state: OrderState,
    },
    /// An earlier run's ENTRY filled, but the broker no longer holds the
    /// position: it was closed outside this process.
    EntryClosedElsewhere { order: PendingOrder, fill_price: f64 },
    /// EXIT fill with no known position to close.
    ExitWithoutPosition { order: PendingOrder, fill_price: f64 },
    /// Reported filled without any usable price.
    Unpriced { order: PendingOrder },
    /// Local status was already terminal and the broker disagrees.
    Conflict {
        order: PendingOrder,
        error: InvalidTransition,
    },
}

impl Settlement {
    pub fn order(&self) -> &PendingOrder {
        match self {
            Settlement::StillOpen(order) => order,
            Settlement::Opened { order, .. }
            | Settlement::Closed { order, .. }
            | Settlement::Retired { order, .. }
            | Settlement::EntryClosedElsewhere { order, .. }
            | Settlement::ExitWithoutPosition { order, .. }
            | Settlement::Unpriced { order }
            | Settlement::Conflict { order, .. } => order,
        }
    }

    pub fn is_fill(&self) -> bool {
        matches!(self, Settlement::Opened { .. } | Settlement::Closed { .. })
    }
}

/// One status lookup and what it did to the working state.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCheck {
    pub order_id: OrderId,
    pub ticker: Ticker,
    pub outcome: Result<Settlement, BrokerError>,
}

/// Positions and pending orders for the rest of a run.
///
/// Keyed by ticker and order id respectively, so at most one position per
/// ticker is representable. `insert_pending` refuses a second open ENTRY
/// for a ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateStore {
    positions: BTreeMap<Ticker, Position>,
    pending: BTreeMap<OrderId, PendingOrder>,
    /// Positions reconciliation dropped this run, consulted when a stale
    /// EXIT fill needs its entry leg.
    dropped: BTreeMap<Ticker, Position>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reconciliation(reconciliation: &Reconciliation) -> Self {
        Self {
            positions: reconciliation.positions.clone(),
            pending: reconciliation.pending.clone(),
            dropped: reconciliation
                .dropped_positions
                .iter()
                .map(|p| (p.ticker.clone(), p.clone()))
                .collect(),
        }
    }

    // ── Positions ────────────────────────────────────────────────────

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn has_position(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn held_side(&self, ticker: &str) -> Option<PositionSide> {
        self.positions.get(ticker).map(|p| p.side)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    // ── Pending orders ───────────────────────────────────────────────

    pub fn pending(&self) -> impl Iterator<Item = &PendingOrder> {
        self.pending.values()
    }

    pub fn pending_order(&self, order_id: &OrderId) -> Option<&PendingOrder> {
        self.pending.get(order_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn open_entry_for(&self, ticker: &str) -> Option<&PendingOrder> {
        self.pending
            .values()
            .find(|o| o.ticker == ticker && o.intent == OrderIntent::Entry)
    }

    pub fn open_exit_for(&self, ticker: &str) -> Option<&PendingOrder> {
        self.pending
            .values()
            .find(|o| o.ticker == ticker && o.intent == OrderIntent::Exit)
    }

    /// Track a newly submitted order.
    pub fn insert_pending(&mut self, order: PendingOrder) -> Result<(), StateError> {
        if order.is_entry() {
            if self.has_position(&order.ticker) {
                return Err(StateError::PositionExists {
                    ticker: order.ticker,
                });
            }
            if self.open_entry_for(&order.ticker).is_some() {
                return Err(StateError::DuplicateEntry {
                    ticker: order.ticker,
                });
            }
        }
        self.pending.insert(order.order_id.clone(), order);
        Ok(())
    }

    pub fn remove_pending(&mut self, order_id: &OrderId) -> Option<PendingOrder> {
        self.pending.remove(order_id)
    }

    /// Pending orders created by `run_id`, oldest first.
    pub fn created_in(&self, run_id: &RunId) -> Vec<PendingOrder> {
        let mut orders: Vec<PendingOrder> = self
            .pending
            .values()
            .filter(|o| o.created_in(run_id))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.submitted_timestamp);
        orders
    }

    // ── Settlement ───────────────────────────────────────────────────

    /// Apply a broker report to `order`, which may or may not still be in
    /// the pending set.
    pub fn settle(
        &mut self,
        order: PendingOrder,
        report: &BrokerOrder,
        now: DateTime<Utc>,
        source: FillSource,
    ) -> Settlement {
        let next = match OrderState::from_status(order.status)
            .advance(OrderState::from_status(report.status))
        {
            Ok(next) => next,
            Err(error) => {
                self.pending.remove(&order.order_id);
                return Settlement::Conflict { order, error };
            }
        };

        if !next.is_terminal() {
            let mut order = order;
            order.status = report.status;
            self.pending.insert(order.order_id.clone(), order.clone());
            return Settlement::StillOpen(order);
        }

        self.pending.remove(&order.order_id);
        let mut order = order;
        order.status = report.status;

        if !next.mutates_position() {
            return Settlement::Retired { order, state: next };
        }

        let Some(fill_price) = report
            .filled_avg_price
            .or(report.limit_price)
            .or(order.limit_price)
        else {
            return Settlement::Unpriced { order };
        };

        match order.intent {
            OrderIntent::Entry => self.settle_entry(order, report, fill_price, now, source),
            OrderIntent::Exit => self.settle_exit(order, report, fill_price, now),
        }
    }

    fn settle_entry(
        &mut self,
        order: PendingOrder,
        report: &BrokerOrder,
        fill_price: f64,
        now: DateTime<Utc>,
        source: FillSource,
    ) -> Settlement {
        if source == FillSource::CurrentRun {
            let quantity = if report.filled_qty > 0.0 {
                report.filled_qty
            } else {
                order.quantity
            };
            let position = Position {
                ticker: order.ticker.clone(),
                side: PositionSide::opened_by(order.side),
                quantity,
                entry_price: fill_price,
                entry_timestamp: now,
                entry_order_id: Some(order.order_id.clone()),
                recovered: false,
            };
            self.positions.insert(position.ticker.clone(), position.clone());
            return Settlement::Opened { order, position };
        }

        let Some(existing) = self.positions.get_mut(&order.ticker) else {
            return Settlement::EntryClosedElsewhere { order, fill_price };
        };
        // Broker figures already won at reconciliation; the order only
        // supplies the clock and the link back to the entry.
        if existing.recovered {
            existing.entry_timestamp = report.filled_at.unwrap_or(order.submitted_timestamp);
            existing.recovered = false;
        }
        if existing.entry_order_id.is_none() {
            existing.entry_order_id = Some(order.order_id.clone());
        }
        let position = existing.clone();
        Settlement::Opened { order, position }
    }

    fn settle_exit(
        &mut self,
        order: PendingOrder,
        report: &BrokerOrder,
        fill_price: f64,
        now: DateTime<Utc>,
    ) -> Settlement {
        let position = self
            .positions
            .remove(&order.ticker)
            .or_else(|| self.dropped.remove(&order.ticker));
        match position {
            Some(position) => {
                let exit_time = report.filled_at.unwrap_or(now);
                let record = RunRecord::close(&position, fill_price, exit_time, order.exit_reason);
                Settlement::Closed { order, record }
            }
            None => Settlement::ExitWithoutPosition { order, fill_price },
        }
    }

    /// Fetch the terminal status of each stale order once and settle it.
    ///
    /// A broker failure leaves the order out of the working set; it was
    /// already missing from the broker's open list, so it is resolved as far
    /// as this run is concerned.
    pub fn resolve_stale<B: Broker + ?Sized>(
        &mut self,
        broker: &B,
        stale: &[PendingOrder],
        now: DateTime<Utc>,
    ) -> Vec<StatusCheck> {
        stale
            .iter()
            .map(|order| {
                let outcome = broker
                    .get_order_status(&order.order_id)
                    .map(|report| self.settle(order.clone(), &report, now, FillSource::PriorRun));
                StatusCheck {
                    order_id: order.order_id.clone(),
                    ticker: order.ticker.clone(),
                    outcome,
                }
            })
            .collect()
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn positions_snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn pending_snapshot(&self) -> Vec<PendingOrder> {
        self.pending.values().cloned().collect()
    }
}
