//! Integration tests for the order lifecycle across runs.
//!
//! Tests:
//! 1. Same-run fill: ENTRY fill opens a position, EXIT fill records the trade
//! 2. Overnight fill: an ENTRY filled between runs is picked up at reconcile
//! 3. Exit filled between runs closes the dropped position into a trade
//! 4. Snapshots round-trip through the state directory between runs

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::HashMap;

use meanrev_core::domain::{
    AccountSnapshot, BrokerOrder, BrokerOrderStatus, BrokerPosition, ExitReason,
    LimitOrderRequest, OrderId, OrderIntent, PositionSide, RunId, Ticker,
};
use meanrev_core::orders::{CoordinatorConfig, EntryCandidate, OrderCoordinator};
use meanrev_core::ports::{Broker, BrokerError};
use meanrev_core::signals::{Signal, SignalClass};
use meanrev_core::state::{reconcile, Settlement, SnapshotStore, StateStore};

// ── Scripted broker ──────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedBroker {
    positions: RefCell<Vec<BrokerPosition>>,
    open_orders: RefCell<Vec<BrokerOrder>>,
    statuses: RefCell<HashMap<OrderId, BrokerOrder>>,
    seq: RefCell<u32>,
    submitted_at: RefCell<Option<DateTime<Utc>>>,
}

impl ScriptedBroker {
    /// The broker fills `order_id` at `price`: the order leaves the open
    /// list and the position changes accordingly.
    fn fill(&self, order_id: &OrderId, price: f64, at: DateTime<Utc>) {
        let mut open = self.open_orders.borrow_mut();
        let idx = open
            .iter()
            .position(|o| &o.order_id == order_id)
            .expect("order is open");
        let mut order = open.remove(idx);
        order.status = BrokerOrderStatus::Filled;
        order.filled_qty = order.quantity;
        order.filled_avg_price = Some(price);
        order.filled_at = Some(at);

        let mut positions = self.positions.borrow_mut();
        match positions.iter().position(|p| p.ticker == order.ticker) {
            Some(i) => {
                positions.remove(i);
            }
            None => positions.push(BrokerPosition {
                ticker: order.ticker.clone(),
                side: PositionSide::opened_by(order.side),
                quantity: order.quantity,
                avg_entry_price: price,
            }),
        }
        self.statuses.borrow_mut().insert(order.order_id.clone(), order);
    }
}

impl Broker for ScriptedBroker {
    fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        Ok(AccountSnapshot {
            cash: 10_000.0,
            day_trade_count: 0,
            is_pdt_restricted: false,
        })
    }

    fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.positions.borrow().clone())
    }

    fn get_open_orders(&self, _: Option<&[Ticker]>) -> Result<Vec<BrokerOrder>, BrokerError> {
        Ok(self.open_orders.borrow().clone())
    }

    fn submit_limit_order(&self, req: &LimitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        let mut seq = self.seq.borrow_mut();
        *seq += 1;
        let order = BrokerOrder {
            order_id: OrderId::new(format!("ord-{seq}")),
            ticker: req.ticker.clone(),
            side: req.side,
            quantity: req.quantity,
            limit_price: Some(req.limit_price),
            status: BrokerOrderStatus::Accepted,
            submitted_at: *self.submitted_at.borrow(),
            filled_qty: 0.0,
            filled_avg_price: None,
            filled_at: None,
        };
        self.open_orders.borrow_mut().push(order.clone());
        self.statuses
            .borrow_mut()
            .insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    fn get_order_status(&self, id: &OrderId) -> Result<BrokerOrder, BrokerError> {
        self.statuses
            .borrow()
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))
    }

    fn cancel_order(&self, id: &OrderId) -> Result<(), BrokerError> {
        self.open_orders.borrow_mut().retain(|o| &o.order_id != id);
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, 14, 0, 0).unwrap()
}

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        position_size_usd: 100.0,
        max_holding_days: 5,
        pdt_limit: 3,
    }
}

fn long_candidate(ticker: &str, price: f64) -> EntryCandidate {
    EntryCandidate {
        ticker: ticker.into(),
        side: PositionSide::Long,
        z_score: -2.0,
        current_price: price,
    }
}

/// Reconcile the way a run does: broker truth plus what the state
/// directory remembers.
fn start_run(broker: &ScriptedBroker, snapshots: &SnapshotStore, now: DateTime<Utc>) -> (StateStore, Vec<Settlement>) {
    let rec = reconcile(
        &broker.get_open_positions().unwrap(),
        &broker.get_open_orders(None).unwrap(),
        &snapshots.load_latest_positions().unwrap(),
        &snapshots.load_pending().unwrap(),
        now,
    );
    let mut store = StateStore::from_reconciliation(&rec);
    let settled = store
        .resolve_stale(broker, &rec.stale_orders, now)
        .into_iter()
        .filter_map(|c| c.outcome.ok())
        .collect();
    (store, settled)
}

fn finish_run(store: &StateStore, snapshots: &SnapshotStore, run_id: &RunId) {
    snapshots.save_pending(&store.pending_snapshot()).unwrap();
    snapshots
        .write_run_snapshot(
            run_id,
            &store.positions_snapshot(),
            &store.pending_snapshot(),
            &serde_json::json!({ "run_id": run_id }),
        )
        .unwrap();
}

// ── 1. Same-run fills ────────────────────────────────────────────────

#[test]
fn same_run_entry_and_exit_fill() {
    let broker = ScriptedBroker::default();
    let run = RunId::from_start(day(3));
    let sized = CoordinatorConfig {
        position_size_usd: 150.0,
        ..config()
    };
    let coord = OrderCoordinator::new(&broker, sized, run);
    let mut store = StateStore::new();

    let entry = coord
        .submit_entry(&mut store, &long_candidate("MSFT", 101.23), day(3))
        .unwrap();
    assert_eq!(entry.quantity, 1.0);
    broker.fill(&entry.order_id, 101.23, day(3));

    let fills = coord.confirm_fills(&mut store, day(3));
    assert_eq!(fills.filled().count(), 1);
    let position = store.position("MSFT").unwrap().clone();
    assert_eq!(position.entry_price, 101.23);
    assert_eq!(position.side, PositionSide::Long);

    let exit_signal = Signal {
        ticker: "MSFT".into(),
        current_price: 105.0,
        moving_average: 105.2,
        std_dev: 2.0,
        z_score: -0.1,
        classification: SignalClass::Exit,
        window: 30,
        as_of: day(2),
    };
    let closes = coord.evaluate_exits(&store, &[exit_signal], day(3));
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].reason, ExitReason::ExitSignal);
    let exit = coord.submit_close(&mut store, &closes[0], 105.0, day(3)).unwrap();
    broker.fill(&exit.order_id, 105.0, day(3));

    let fills = coord.confirm_fills(&mut store, day(3));
    let records: Vec<_> = fills
        .filled()
        .filter_map(|s| match s {
            Settlement::Closed { record, .. } => Some(record.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(records.len(), 1);
    assert!((records[0].pnl - 3.77).abs() < 1e-9);
    assert!(!store.has_position("MSFT"));
    assert_eq!(store.pending_count(), 0);
}

// ── 2-4. Across runs ─────────────────────────────────────────────────

#[test]
fn overnight_fills_are_picked_up_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots = SnapshotStore::new(dir.path());
    let broker = ScriptedBroker::default();

    // Run 1: entry placed, not filled before the run ends.
    *broker.submitted_at.borrow_mut() = Some(day(3));
    let run1 = RunId::from_start(day(3));
    let (mut store, settled) = start_run(&broker, &snapshots, day(3));
    assert!(settled.is_empty());
    let coord = OrderCoordinator::new(&broker, config(), run1.clone());
    let entry = coord
        .submit_entry(&mut store, &long_candidate("KO", 60.0), day(3))
        .unwrap();
    let fills = coord.confirm_fills(&mut store, day(3));
    assert_eq!(fills.still_open().count(), 1);
    finish_run(&store, &snapshots, &run1);

    // Filled after the run.
    let filled_at = day(3) + Duration::hours(1);
    broker.fill(&entry.order_id, 59.95, filled_at);

    // Run 2: reconcile sees the position and resolves the stale ENTRY.
    let run2 = RunId::from_start(day(4));
    let (store, settled) = start_run(&broker, &snapshots, day(4));
    assert!(matches!(settled.as_slice(), [Settlement::Opened { .. }]));
    let ko = store.position("KO").unwrap();
    assert_eq!(ko.entry_timestamp, filled_at);
    assert_eq!(ko.entry_order_id.as_ref(), Some(&entry.order_id));
    assert!(!ko.recovered);
    assert_eq!(store.pending_count(), 0);
    finish_run(&store, &snapshots, &run2);

    // Run 3, five days after entry: MAX_HOLD exit goes out.
    *broker.submitted_at.borrow_mut() = Some(day(8));
    let run3 = RunId::from_start(day(8));
    let (mut store, _) = start_run(&broker, &snapshots, day(8));
    assert_eq!(store.position("KO").unwrap().entry_timestamp, filled_at);
    let coord = OrderCoordinator::new(&broker, config(), run3.clone());
    let closes = coord.evaluate_exits(&store, &[], day(8));
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].reason, ExitReason::MaxHold);
    let exit = coord.submit_close(&mut store, &closes[0], 61.0, day(8)).unwrap();
    coord.confirm_fills(&mut store, day(8));
    finish_run(&store, &snapshots, &run3);

    // Run 4 before the exit fills: nothing new is placed.
    let (store, _) = start_run(&broker, &snapshots, day(9));
    let pending = store.open_exit_for("KO").unwrap();
    assert_eq!(pending.intent, OrderIntent::Exit);
    assert_eq!(pending.exit_reason, Some(ExitReason::MaxHold));
    let coord = OrderCoordinator::new(&broker, config(), RunId::from_start(day(9)));
    assert!(coord.evaluate_exits(&store, &[], day(9)).is_empty());
    finish_run(&store, &snapshots, &RunId::from_start(day(9)));

    // Exit fills; run 5 records the trade from the dropped position.
    broker.fill(&exit.order_id, 61.0, day(9) + Duration::hours(2));
    let (store, settled) = start_run(&broker, &snapshots, day(10));
    let record = match settled.as_slice() {
        [Settlement::Closed { record, .. }] => record,
        other => panic!("expected one Closed, got {other:?}"),
    };
    assert_eq!(record.entry_time, filled_at);
    assert_eq!(record.exit_reason, Some(ExitReason::MaxHold));
    assert!((record.pnl - (61.0 - 59.95)).abs() < 1e-9);
    assert_eq!(store.position_count(), 0);
    assert_eq!(store.pending_count(), 0);
}
