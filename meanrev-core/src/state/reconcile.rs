//! Broker-as-truth merge of positions and pending orders.
//!
//! Pure: takes the broker's snapshot and the previous run's local records,
//! returns the merged working state plus what fell out of it. The broker
//! wins on every field it reports. Local records contribute only what the
//! broker does not keep: entry timestamp, entry order, intent, placement
//! z-score, exit reason and originating run.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::{
    BrokerOrder, BrokerPosition, OrderId, OrderIntent, PendingOrder, Position, PositionSide,
    Ticker,
};

/// Something reconciliation changed relative to the local records.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// Broker position with no local record; synthesized with `now` as the
    /// entry timestamp.
    Recovered { ticker: Ticker },
    /// Broker reports the opposite side from the local record. Treated as a
    /// new position.
    SideFlipped {
        ticker: Ticker,
        local: PositionSide,
        broker: PositionSide,
    },
    /// Local position the broker no longer reports.
    PositionDropped { ticker: Ticker },
    /// Broker reported more than one position for a ticker; only the first
    /// is kept.
    DuplicateBrokerPosition { ticker: Ticker },
    /// Open broker order with no local record.
    Adopted {
        order_id: OrderId,
        ticker: Ticker,
        intent: OrderIntent,
    },
    /// Local pending order the broker no longer lists as open.
    OrderNoLongerOpen { order_id: OrderId, ticker: Ticker },
}

impl ReconcileEvent {
    /// Ticker of a position synthesized from broker data, for the events
    /// that create one.
    pub fn recovered_ticker(&self) -> Option<&Ticker> {
        match self {
            ReconcileEvent::Recovered { ticker } | ReconcileEvent::SideFlipped { ticker, .. } => {
                Some(ticker)
            }
            _ => None,
        }
    }
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    pub positions: BTreeMap<Ticker, Position>,
    pub pending: BTreeMap<OrderId, PendingOrder>,
    /// Local pending orders missing from the broker's open list. Their
    /// terminal status still has to be fetched once.
    pub stale_orders: Vec<PendingOrder>,
    /// Local positions the broker no longer reports. Kept so a stale EXIT
    /// fill can still be turned into a trade record.
    pub dropped_positions: Vec<Position>,
    pub events: Vec<ReconcileEvent>,
}

impl Reconciliation {
    pub fn recovered_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.recovered_ticker().is_some())
            .count()
    }

    pub fn adopted_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ReconcileEvent::Adopted { .. }))
            .count()
    }
}

/// Merge broker truth with local records.
///
/// Deterministic for identical inputs, and idempotent: feeding the result
/// back as the local side with unchanged broker state yields the same
/// positions and pending orders.
pub fn reconcile(
    broker_positions: &[BrokerPosition],
    broker_orders: &[BrokerOrder],
    local_positions: &[Position],
    local_pending: &[PendingOrder],
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    let local_by_ticker: BTreeMap<&str, &Position> = local_positions
        .iter()
        .map(|p| (p.ticker.as_str(), p))
        .collect();

    // Phase 1: positions
    for bp in broker_positions {
        if out.positions.contains_key(&bp.ticker) {
            out.events.push(ReconcileEvent::DuplicateBrokerPosition {
                ticker: bp.ticker.clone(),
            });
            continue;
        }
        let merged = match local_by_ticker.get(bp.ticker.as_str()) {
            Some(local) if local.side == bp.side => Position {
                ticker: bp.ticker.clone(),
                side: bp.side,
                quantity: bp.quantity,
                entry_price: bp.avg_entry_price,
                entry_timestamp: local.entry_timestamp,
                entry_order_id: local.entry_order_id.clone(),
                recovered: local.recovered,
            },
            Some(local) => {
                out.events.push(ReconcileEvent::SideFlipped {
                    ticker: bp.ticker.clone(),
                    local: local.side,
                    broker: bp.side,
                });
                recovered(bp, now)
            }
            None => {
                out.events.push(ReconcileEvent::Recovered {
                    ticker: bp.ticker.clone(),
                });
                recovered(bp, now)
            }
        };
        out.positions.insert(bp.ticker.clone(), merged);
    }

    for local in local_by_ticker.values() {
        if !out.positions.contains_key(&local.ticker) {
            out.events.push(ReconcileEvent::PositionDropped {
                ticker: local.ticker.clone(),
            });
            out.dropped_positions.push((*local).clone());
        }
    }

    // Phase 2: orders
    let local_by_id: BTreeMap<&OrderId, &PendingOrder> =
        local_pending.iter().map(|o| (&o.order_id, o)).collect();

    for bo in broker_orders {
        let merged = match local_by_id.get(&bo.order_id) {
            Some(local) => PendingOrder {
                order_id: bo.order_id.clone(),
                ticker: bo.ticker.clone(),
                side: bo.side,
                intent: local.intent,
                submitted_timestamp: bo.submitted_at.unwrap_or(local.submitted_timestamp),
                limit_price: bo.limit_price.or(local.limit_price),
                quantity: bo.quantity,
                status: bo.status,
                z_at_placement: local.z_at_placement,
                exit_reason: local.exit_reason,
                run_id: local.run_id.clone(),
            },
            None => {
                let intent = if out.positions.contains_key(&bo.ticker) {
                    OrderIntent::Exit
                } else {
                    OrderIntent::Entry
                };
                out.events.push(ReconcileEvent::Adopted {
                    order_id: bo.order_id.clone(),
                    ticker: bo.ticker.clone(),
                    intent,
                });
                PendingOrder {
                    order_id: bo.order_id.clone(),
                    ticker: bo.ticker.clone(),
                    side: bo.side,
                    intent,
                    submitted_timestamp: bo.submitted_at.unwrap_or(now),
                    limit_price: bo.limit_price,
                    quantity: bo.quantity,
                    status: bo.status,
                    z_at_placement: None,
                    exit_reason: None,
                    run_id: None,
                }
            }
        };
        out.pending.insert(merged.order_id.clone(), merged);
    }

    for local in local_by_id.values() {
        if !out.pending.contains_key(&local.order_id) {
            out.events.push(ReconcileEvent::OrderNoLongerOpen {
                order_id: local.order_id.clone(),
                ticker: local.ticker.clone(),
            });
            out.stale_orders.push((*local).clone());
        }
    }

    out
}

fn recovered(bp: &BrokerPosition, now: DateTime<Utc>) -> Position {
    Position {
        ticker: bp.ticker.clone(),
        side: bp.side,
        quantity: bp.quantity,
        entry_price: bp.avg_entry_price,
        entry_timestamp: now,
        entry_order_id: None,
        recovered: true,
    }
}
