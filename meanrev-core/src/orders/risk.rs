//! Entry risk gates: a per-run cash budget and the PDT threshold.
//!
//! PDT handling is a threshold on the broker's own day-trade counter for
//! accounts the broker flags as restricted. Day trades are never counted
//! locally.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::AccountSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockReason {
    Cash,
    Pdt,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockReason::Cash => "cash",
            BlockReason::Pdt => "pdt",
        })
    }
}

/// A deliberate skip, not a failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskGateBlocked {
    pub reason: BlockReason,
    /// Cash left in the budget when the candidate was checked.
    pub available_cash: f64,
    pub required_cash: f64,
}

impl fmt::Display for RiskGateBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            BlockReason::Cash => write!(
                f,
                "blocked (cash): need ${:.2}, ${:.2} left",
                self.required_cash, self.available_cash
            ),
            BlockReason::Pdt => f.write_str("blocked (pdt): day-trade limit reached"),
        }
    }
}

/// Cash available for entries within one run. Each approval reserves the
/// position size up front so later candidates see what is left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CashBudget {
    remaining: f64,
}

impl CashBudget {
    pub fn new(cash: f64) -> Self {
        Self {
            remaining: cash.max(0.0),
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    fn reserve(&mut self, amount: f64) {
        self.remaining -= amount;
    }

    /// Return a reservation whose order was never placed.
    pub fn release(&mut self, amount: f64) {
        self.remaining += amount;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLimits {
    pub position_size_usd: f64,
    pub pdt_limit: u32,
}

/// Approve or block one entry. Approval reserves `position_size_usd` from
/// `budget`.
pub fn check_risk_gates(
    budget: &mut CashBudget,
    account: &AccountSnapshot,
    limits: &RiskLimits,
) -> Result<(), RiskGateBlocked> {
    let blocked = |reason| RiskGateBlocked {
        reason,
        available_cash: budget.remaining(),
        required_cash: limits.position_size_usd,
    };

    if account.is_pdt_restricted && account.day_trade_count >= limits.pdt_limit {
        return Err(blocked(BlockReason::Pdt));
    }
    if limits.position_size_usd > budget.remaining() {
        return Err(blocked(BlockReason::Cash));
    }
    budget.reserve(limits.position_size_usd);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits {
            position_size_usd: 100.0,
            pdt_limit: 3,
        }
    }

    fn account(cash: f64, trades: u32, flagged: bool) -> AccountSnapshot {
        AccountSnapshot {
            cash,
            day_trade_count: trades,
            is_pdt_restricted: flagged,
        }
    }

    #[test]
    fn insufficient_cash_blocks() {
        let acct = account(50.0, 0, false);
        let mut budget = CashBudget::new(acct.cash);
        let err = check_risk_gates(&mut budget, &acct, &limits()).unwrap_err();
        assert_eq!(err.reason, BlockReason::Cash);
        assert_eq!(budget.remaining(), 50.0);
    }

    #[test]
    fn approvals_draw_down_the_budget() {
        let acct = account(250.0, 0, false);
        let mut budget = CashBudget::new(acct.cash);
        assert!(check_risk_gates(&mut budget, &acct, &limits()).is_ok());
        assert!(check_risk_gates(&mut budget, &acct, &limits()).is_ok());
        let err = check_risk_gates(&mut budget, &acct, &limits()).unwrap_err();
        assert_eq!(err.reason, BlockReason::Cash);
        assert_eq!(budget.remaining(), 50.0);
    }

    #[test]
    fn exact_cash_is_enough() {
        let acct = account(100.0, 0, false);
        let mut budget = CashBudget::new(acct.cash);
        assert!(check_risk_gates(&mut budget, &acct, &limits()).is_ok());
        assert_eq!(budget.remaining(), 0.0);
    }

    #[test]
    fn pdt_needs_both_flag_and_count() {
        let flagged_at_limit = account(1000.0, 3, true);
        let mut budget = CashBudget::new(1000.0);
        let err = check_risk_gates(&mut budget, &flagged_at_limit, &limits()).unwrap_err();
        assert_eq!(err.reason, BlockReason::Pdt);

        let unflagged = account(1000.0, 5, false);
        assert!(check_risk_gates(&mut budget, &unflagged, &limits()).is_ok());

        let flagged_below = account(1000.0, 2, true);
        assert!(check_risk_gates(&mut budget, &flagged_below, &limits()).is_ok());
    }

    #[test]
    fn release_restores_reservation() {
        let acct = account(100.0, 0, false);
        let mut budget = CashBudget::new(acct.cash);
        check_risk_gates(&mut budget, &acct, &limits()).unwrap();
        budget.release(100.0);
        assert_eq!(budget.remaining(), 100.0);
    }

    #[test]
    fn negative_cash_counts_as_none() {
        assert_eq!(CashBudget::new(-20.0).remaining(), 0.0);
    }
}
