//! MeanRev Core: domain types, signals, state reconciliation and order
//! coordination for a once-a-day mean-reversion job.
//!
//! This crate contains everything that decides what to trade:
//! - Domain types (positions, pending orders, broker records, trade records)
//! - SignalEngine: rolling z-score and its classification
//! - StateStore: broker-as-truth reconciliation and on-disk snapshots
//! - OrderCoordinator: exits, entries, risk gates, fills, the order state machine
//! - Collaborator traits for the broker, market data and the ledger
//!
//! It performs no network I/O. File I/O is limited to state snapshots.

pub mod domain;
pub mod journal;
pub mod orders;
pub mod ports;
pub mod signals;
pub mod state;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types can cross thread boundaries, so a
    /// scheduler can hand a finished run's results to another thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::PendingOrder>();
        require_sync::<domain::PendingOrder>();
        require_send::<domain::BrokerOrder>();
        require_sync::<domain::BrokerOrder>();
        require_send::<domain::RunRecord>();
        require_sync::<domain::RunRecord>();
        require_send::<domain::AccountSnapshot>();
        require_sync::<domain::AccountSnapshot>();

        // ID types
        require_send::<domain::OrderId>();
        require_sync::<domain::OrderId>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        // Signals
        require_send::<signals::Signal>();
        require_sync::<signals::Signal>();
        require_send::<signals::SignalConfig>();
        require_sync::<signals::SignalConfig>();

        // State
        require_send::<state::StateStore>();
        require_sync::<state::StateStore>();
        require_send::<state::Reconciliation>();
        require_sync::<state::Reconciliation>();
        require_send::<state::SnapshotStore>();
        require_sync::<state::SnapshotStore>();

        // Orders
        require_send::<orders::CloseInstruction>();
        require_sync::<orders::CloseInstruction>();
        require_send::<orders::EntryCandidate>();
        require_sync::<orders::EntryCandidate>();
        require_send::<orders::CashBudget>();
        require_sync::<orders::CashBudget>();

        // Journal
        require_send::<journal::ActionLog>();
        require_sync::<journal::ActionLog>();

        // Errors
        require_send::<signals::SignalError>();
        require_sync::<signals::SignalError>();
        require_send::<state::StateError>();
        require_sync::<state::StateError>();
        require_send::<orders::OrderError>();
        require_sync::<orders::OrderError>();
    }

    /// Architecture contract: signal computation sees prices and the held
    /// side only, never broker or store state.
    #[test]
    fn signal_engine_takes_no_broker_or_store() {
        fn _check_signature(
            history: &[domain::PricePoint],
            config: &signals::SignalConfig,
        ) -> Result<signals::Signal, signals::SignalError> {
            signals::compute_signal("AAPL", history, 100.0, None, config)
        }
    }

    /// Architecture contract: reconciliation is a pure function of its
    /// inputs; it takes no broker handle.
    #[test]
    fn reconcile_is_a_pure_merge() {
        fn _check_signature(
            positions: &[domain::BrokerPosition],
            orders: &[domain::BrokerOrder],
        ) -> state::Reconciliation {
            state::reconcile(positions, orders, &[], &[], chrono::Utc::now())
        }
    }
}
