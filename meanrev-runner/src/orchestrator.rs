//! RunOrchestrator: one full daily cycle.
//!
//! Sequence:
//! 1. Account check (authentication failure aborts before anything else)
//! 2. Broker truth: open positions and open orders (failure aborts)
//! 3. Reconcile with local snapshots, settle stale orders, cancel stale entries
//! 4. Signals per ticker (a failing ticker is skipped, never fatal)
//! 5. Exits, then entries behind the risk gates
//! 6. Fill checks for this run's orders
//! 7. Persist snapshots, append trades, write the action log
//!
//! Every decision goes to the run's `ActionLog` as well as `tracing`.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

use meanrev_core::domain::{AccountSnapshot, PositionSide, RunId, RunRecord, Ticker};
use meanrev_core::journal::ActionLog;
use meanrev_core::orders::{CancelOutcome, CashBudget, OrderCoordinator, OrderError};
use meanrev_core::ports::{Broker, BrokerError, Ledger, LedgerError, MarketData, MarketDataError};
use meanrev_core::signals::{compute_signal, Signal, SignalConfig, SignalError};
use meanrev_core::state::{
    reconcile, ReconcileEvent, Settlement, SnapshotStore, StateError, StateStore, StatusCheck,
};

use crate::config::{BotConfig, ConfigError};
use crate::manifest::{RunManifest, RunSummary, MANIFEST_SCHEMA_VERSION};

/// Errors that end a run early. Everything per ticker or per order is
/// logged and skipped instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("broker authentication failed, nothing was done: {0}")]
    Unauthenticated(#[source] BrokerError),

    #[error("cannot read broker state, nothing was done: {0}")]
    BrokerState(#[source] BrokerError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// What a successful run reports back.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub manifest: RunManifest,
    pub records: Vec<RunRecord>,
    pub log: ActionLog,
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        &self.manifest.summary
    }
}

// ── Per-ticker evaluation ────────────────────────────────────────────

#[derive(Debug, Error)]
enum TickerError {
    #[error("latest price unavailable: {0}")]
    Price(#[source] MarketDataError),

    #[error("history unavailable: {0}")]
    History(#[source] MarketDataError),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

struct TickerEvaluation {
    /// Kept even when the signal fails, so a MAX_HOLD close can still be
    /// priced.
    price: Option<f64>,
    signal: Result<Signal, TickerError>,
}

fn evaluate_ticker<M: MarketData + ?Sized>(
    market: &M,
    ticker: &str,
    held: Option<PositionSide>,
    config: &SignalConfig,
    now: DateTime<Utc>,
) -> TickerEvaluation {
    let price = match market.get_latest_price(ticker) {
        Ok(price) => price,
        Err(e) => {
            return TickerEvaluation {
                price: None,
                signal: Err(TickerError::Price(e)),
            }
        }
    };
    let signal = market
        .get_history(ticker, config.window, now)
        .map_err(TickerError::History)
        .and_then(|history| Ok(compute_signal(ticker, &history, price, held, config)?));
    TickerEvaluation {
        price: Some(price),
        signal,
    }
}

/// Universe first, then any held ticker the universe no longer lists, so
/// every open position is still evaluated for exit.
fn tickers_to_evaluate(universe: &[String], store: &StateStore) -> Vec<Ticker> {
    let mut tickers: Vec<Ticker> = universe.to_vec();
    for position in store.positions() {
        if !tickers.contains(&position.ticker) {
            tickers.push(position.ticker.clone());
        }
    }
    tickers
}

// ── Logging helpers ──────────────────────────────────────────────────

fn log_reconcile_event(log: &mut ActionLog, event: &ReconcileEvent) {
    match event {
        ReconcileEvent::Recovered { ticker } => log.warn(
            Some(ticker.as_str()),
            "recovered position from broker with no local record; entry time set to now",
        ),
        ReconcileEvent::SideFlipped { ticker, local, broker } => log.warn(
            Some(ticker.as_str()),
            format!(
                "broker reports {} but local record was {}; treated as a new position",
                broker.as_str(),
                local.as_str()
            ),
        ),
        ReconcileEvent::PositionDropped { ticker } => log.warn(
            Some(ticker.as_str()),
            "local position no longer held at broker; dropped",
        ),
        ReconcileEvent::DuplicateBrokerPosition { ticker } => log.warn(
            Some(ticker.as_str()),
            "broker listed the ticker twice; kept the first position",
        ),
        ReconcileEvent::Adopted {
            order_id,
            ticker,
            intent,
        } => log.warn(
            Some(ticker.as_str()),
            format!("adopted unknown open order {order_id} as {intent:?}"),
        ),
        ReconcileEvent::OrderNoLongerOpen { order_id, ticker } => log.info(
            Some(ticker.as_str()),
            format!("order {order_id} no longer open at broker; checking final status"),
        ),
    }
}

/// Collects the effects of settlements across the run.
struct Settlements<'a> {
    log: &'a mut ActionLog,
    summary: &'a mut RunSummary,
    records: &'a mut Vec<RunRecord>,
}

impl Settlements<'_> {
    fn apply(&mut self, settlement: Settlement) {
        let ticker = settlement.order().ticker.clone();
        let t = Some(ticker.as_str());
        match settlement {
            Settlement::StillOpen(order) => self.log.info(
                t,
                format!("order {} still working ({})", order.order_id, order.status.as_str()),
            ),
            Settlement::Opened { order, position } => {
                self.summary.fills_confirmed += 1;
                self.log.info(
                    t,
                    format!(
                        "entry {} filled: {} {} @ {:.2}",
                        order.order_id,
                        position.side.as_str(),
                        position.quantity,
                        position.entry_price
                    ),
                );
            }
            Settlement::Closed { order, record } => {
                self.summary.fills_confirmed += 1;
                self.log.info(
                    t,
                    format!(
                        "exit {} filled @ {:.2}, pnl {:.2}",
                        order.order_id, record.exit_price, record.pnl
                    ),
                );
                self.records.push(record);
            }
            Settlement::Retired { order, state } => self.log.info(
                t,
                format!("order {} {}; no longer tracked", order.order_id, state),
            ),
            Settlement::EntryClosedElsewhere { order, fill_price } => self.log.warn(
                t,
                format!(
                    "entry {} filled @ {fill_price:.2} but broker holds no position; closed outside this process",
                    order.order_id
                ),
            ),
            Settlement::ExitWithoutPosition { order, fill_price } => self.log.warn(
                t,
                format!(
                    "exit {} filled @ {fill_price:.2} with no known position; no trade recorded",
                    order.order_id
                ),
            ),
            Settlement::Unpriced { order } => self.log.error(
                t,
                format!("order {} reported filled without a price; dropped", order.order_id),
            ),
            Settlement::Conflict { order, error } => self.log.warn(
                t,
                format!("order {}: {error}", order.order_id),
            ),
        }
    }

    fn apply_check(&mut self, check: StatusCheck) {
        match check.outcome {
            Ok(settlement) => self.apply(settlement),
            Err(e) => self.log.warn(
                Some(check.ticker.as_str()),
                format!("status lookup for order {} failed: {e}", check.order_id),
            ),
        }
    }
}

// ── The run ──────────────────────────────────────────────────────────

/// Run one daily cycle against `broker` and `market`, recording into
/// `ledger` and the state directory named in `config`.
pub fn run_daily_cycle<B, M, L>(
    config: &BotConfig,
    broker: &B,
    market: &M,
    ledger: &mut L,
    started_at: DateTime<Utc>,
) -> Result<RunOutcome, RunError>
where
    B: Broker + ?Sized,
    M: MarketData + ?Sized,
    L: Ledger + ?Sized,
{
    config.validate()?;
    let now = started_at;
    let run_id = RunId::from_start(started_at);
    let snapshots = SnapshotStore::new(&config.paths.state_dir);
    let mut log = ActionLog::new();
    let mut summary = RunSummary {
        account_available: true,
        ..RunSummary::default()
    };
    let mut records = Vec::new();

    log.info(
        None,
        format!("run {run_id} started: {} tickers in universe", config.universe.len()),
    );

    // ── 1. Account ───────────────────────────────────────────────────
    let account = match broker.get_account() {
        Ok(account) => account,
        Err(e) if e.is_unauthenticated() => {
            log.error(None, format!("authentication failed, aborting: {e}"));
            write_log_best_effort(ledger, &run_id, &log);
            return Err(RunError::Unauthenticated(e));
        }
        Err(e) => {
            log.warn(None, format!("account unavailable ({e}); exits only this run"));
            summary.account_available = false;
            AccountSnapshot::unavailable()
        }
    };

    // ── 2. Broker truth ──────────────────────────────────────────────
    let broker_state = broker
        .get_open_positions()
        .and_then(|positions| Ok((positions, broker.get_open_orders(None)?)));
    let (broker_positions, broker_orders) = match broker_state {
        Ok(state) => state,
        Err(e) => {
            log.error(None, format!("cannot read broker positions/orders, aborting: {e}"));
            write_log_best_effort(ledger, &run_id, &log);
            return Err(match e {
                BrokerError::Unauthenticated(_) => RunError::Unauthenticated(e),
                other => RunError::BrokerState(other),
            });
        }
    };

    // ── 3. Reconcile ─────────────────────────────────────────────────
    let local_positions = snapshots.load_latest_positions()?;
    let local_pending = snapshots.load_pending()?;
    let reconciliation = reconcile(
        &broker_positions,
        &broker_orders,
        &local_positions,
        &local_pending,
        now,
    );
    for event in reconciliation
        .events
        .iter()
        .filter(|e| e.recovered_ticker().is_none())
    {
        log_reconcile_event(&mut log, event);
    }
    summary.adopted_orders = reconciliation.adopted_count();
    log.info(
        None,
        format!(
            "reconciled: {} positions, {} open orders, {} to resolve",
            reconciliation.positions.len(),
            reconciliation.pending.len(),
            reconciliation.stale_orders.len()
        ),
    );

    let mut store = StateStore::from_reconciliation(&reconciliation);
    let coordinator = OrderCoordinator::new(broker, config.coordinator(), run_id.clone());
    {
        let mut settle = Settlements {
            log: &mut log,
            summary: &mut summary,
            records: &mut records,
        };
        for check in store.resolve_stale(broker, &reconciliation.stale_orders, now) {
            settle.apply_check(check);
        }
        for outcome in coordinator.cancel_stale_entries(&mut store, now) {
            match outcome {
                CancelOutcome::Canceled(order) => settle.log.info(
                    Some(order.ticker.as_str()),
                    format!("canceled stale entry {} (position already open)", order.order_id),
                ),
                CancelOutcome::AlreadyTerminal(settlement) => settle.apply(settlement),
                CancelOutcome::Failed { order, error } => settle.log.warn(
                    Some(order.ticker.as_str()),
                    format!("cancel of stale entry {} failed: {error}; still tracked", order.order_id),
                ),
            }
        }
    }

    // A stale ENTRY that filled overnight claims its broker position above;
    // only positions still unexplained count as recovered.
    for event in &reconciliation.events {
        let Some(ticker) = event.recovered_ticker() else {
            continue;
        };
        if store.position(ticker).is_some_and(|p| p.recovered) {
            log_reconcile_event(&mut log, event);
            summary.recovered_positions += 1;
        }
    }

    // ── 4. Signals ───────────────────────────────────────────────────
    let mut signals: Vec<Signal> = Vec::new();
    let mut prices: BTreeMap<Ticker, f64> = BTreeMap::new();
    for ticker in tickers_to_evaluate(&config.universe, &store) {
        let held = store.held_side(&ticker);
        let eval = evaluate_ticker(market, &ticker, held, &config.signal, now);
        if let Some(price) = eval.price {
            prices.insert(ticker.clone(), price);
        }
        match eval.signal {
            Ok(signal) => {
                summary.tickers_evaluated += 1;
                log.info(
                    Some(ticker.as_str()),
                    format!(
                        "price {:.2} ma {:.2} sd {:.2} z {:.2} -> {}",
                        signal.current_price,
                        signal.moving_average,
                        signal.std_dev,
                        signal.z_score,
                        signal.classification.as_str()
                    ),
                );
                signals.push(signal);
            }
            Err(e) => {
                summary.tickers_skipped += 1;
                log.warn(Some(ticker.as_str()), format!("skipped: {e}"));
            }
        }
    }

    // ── 5a. Exits ────────────────────────────────────────────────────
    for instruction in coordinator.evaluate_exits(&store, &signals, now) {
        let ticker = instruction.ticker.clone();
        let Some(&price) = prices.get(&ticker) else {
            log.warn(
                Some(ticker.as_str()),
                format!("close ({}) skipped: no current price", instruction.reason),
            );
            continue;
        };
        match coordinator.submit_close(&mut store, &instruction, price, now) {
            Ok(order) => {
                summary.closes_submitted += 1;
                log.info(
                    Some(ticker.as_str()),
                    format!(
                        "close submitted ({}, held {} days): {} {} @ {:.2}, order {}",
                        instruction.reason,
                        instruction.holding_days,
                        order.side.as_str(),
                        order.quantity,
                        order.limit_price.unwrap_or(price),
                        order.order_id
                    ),
                );
            }
            Err(e) => log.error(Some(ticker.as_str()), format!("close failed: {e}")),
        }
    }

    // ── 5b. Entries ──────────────────────────────────────────────────
    let mut budget = CashBudget::new(account.cash);
    for candidate in coordinator.evaluate_entries(&store, &signals) {
        let ticker = candidate.ticker.clone();
        if let Err(blocked) = coordinator.check_risk_gates(&mut budget, &account) {
            summary.record_block(blocked.reason);
            log.info(Some(ticker.as_str()), format!("entry {blocked}"));
            continue;
        }
        match coordinator.submit_entry(&mut store, &candidate, now) {
            Ok(order) => {
                summary.entries_submitted += 1;
                log.info(
                    Some(ticker.as_str()),
                    format!(
                        "entry submitted (z {:.2}): {} {} @ {:.2}, order {}",
                        candidate.z_score,
                        order.side.as_str(),
                        order.quantity,
                        order.limit_price.unwrap_or(candidate.current_price),
                        order.order_id
                    ),
                );
            }
            Err(e) => {
                budget.release(config.position_size_usd);
                match e {
                    OrderError::BelowOneShare { .. } => log.info(Some(ticker.as_str()), format!("entry skipped: {e}")),
                    _ => log.error(Some(ticker.as_str()), format!("entry failed: {e}")),
                }
            }
        }
    }

    // ── 6. Fills ─────────────────────────────────────────────────────
    let report = coordinator.confirm_fills(&mut store, now);
    {
        let mut settle = Settlements {
            log: &mut log,
            summary: &mut summary,
            records: &mut records,
        };
        for check in report.checks {
            settle.apply_check(check);
        }
    }

    // ── 7. Persist ───────────────────────────────────────────────────
    summary.trades_recorded = records.len();
    summary.open_positions = store.position_count();
    summary.pending_orders = store.pending_count();
    let manifest = RunManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        run_id: run_id.clone(),
        started_at,
        finished_at: Utc::now().max(started_at),
        config_fingerprint: config.fingerprint(),
        paper: config.broker.paper,
        summary,
    };

    let pending = store.pending_snapshot();
    let persisted = snapshots.save_pending(&pending).and_then(|()| {
        snapshots.write_run_snapshot(&run_id, &store.positions_snapshot(), &pending, &manifest)
    });
    match &persisted {
        Ok(dir) => log.info(None, format!("snapshot written to {}", dir.display())),
        Err(e) => log.error(None, format!("failed to persist state: {e}")),
    }

    // Trades are appended even when the snapshot failed: they are final.
    let appended = ledger.append_records(&records);
    if let Err(e) = &appended {
        log.error(None, format!("failed to append trade records: {e}"));
    }
    log.info(
        None,
        format!(
            "run {run_id} finished: {} closes, {} entries, {} fills",
            manifest.summary.closes_submitted,
            manifest.summary.entries_submitted,
            manifest.summary.fills_confirmed
        ),
    );
    let written = ledger.write_action_log(&run_id, &log);

    persisted?;
    appended?;
    written?;

    Ok(RunOutcome {
        manifest,
        records,
        log,
    })
}

fn write_log_best_effort<L: Ledger + ?Sized>(ledger: &mut L, run_id: &RunId, log: &ActionLog) {
    if let Err(e) = ledger.write_action_log(run_id, log) {
        tracing::warn!(error = %e, "could not write action log");
    }
}
