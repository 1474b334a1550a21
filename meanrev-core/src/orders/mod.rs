//! OrderCoordinator and the order lifecycle.
//!
//! Provides exit/entry evaluation, risk gates, order submission, fill
//! confirmation and the `Submitted → terminal` state machine.

pub mod coordinator;
pub mod lifecycle;
pub mod risk;

pub use coordinator::{
    exit_reason_for, CancelOutcome, CloseInstruction, CoordinatorConfig, EntryCandidate,
    FillReport, OrderCoordinator, OrderError,
};
pub use lifecycle::{InvalidTransition, OrderState};
pub use risk::{check_risk_gates, BlockReason, CashBudget, RiskGateBlocked, RiskLimits};
