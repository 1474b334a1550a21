//! Order lifecycle state machine.
//!
//! `Submitted → {Filled, Canceled, Rejected, Expired}`. Every broker status
//! collapses onto one of these five states. Only `Filled` mutates positions
//! or produces a trade record; the other terminal states just retire the
//! pending order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::BrokerOrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Accepted by the broker and still working (includes partial fills).
    Submitted,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid order transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: OrderState,
    pub to: OrderState,
}

impl OrderState {
    /// Collapse a broker status. Partial fills stay `Submitted`: only a
    /// complete fill counts.
    pub fn from_status(status: BrokerOrderStatus) -> Self {
        use BrokerOrderStatus as S;
        match status {
            S::Filled => OrderState::Filled,
            S::Canceled | S::Replaced => OrderState::Canceled,
            S::Rejected => OrderState::Rejected,
            S::Expired | S::DoneForDay => OrderState::Expired,
            S::New
            | S::Accepted
            | S::PendingNew
            | S::PartiallyFilled
            | S::PendingCancel
            | S::PendingReplace
            | S::Suspended
            | S::Stopped
            | S::Held
            | S::Unknown => OrderState::Submitted,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != OrderState::Submitted
    }

    /// True only for the transition that creates or closes a position.
    pub fn mutates_position(self) -> bool {
        self == OrderState::Filled
    }

    /// Move to `next`. A terminal state only accepts itself.
    pub fn advance(self, next: OrderState) -> Result<OrderState, InvalidTransition> {
        match self {
            OrderState::Submitted => Ok(next),
            terminal if terminal == next => Ok(next),
            from => Err(InvalidTransition { from, to: next }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::Submitted => "SUBMITTED",
            OrderState::Filled => "FILLED",
            OrderState::Canceled => "CANCELED",
            OrderState::Rejected => "REJECTED",
            OrderState::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_statuses_collapse() {
        assert_eq!(
            OrderState::from_status(BrokerOrderStatus::Filled),
            OrderState::Filled
        );
        assert_eq!(
            OrderState::from_status(BrokerOrderStatus::DoneForDay),
            OrderState::Expired
        );
        assert_eq!(
            OrderState::from_status(BrokerOrderStatus::Replaced),
            OrderState::Canceled
        );
        assert_eq!(
            OrderState::from_status(BrokerOrderStatus::PartiallyFilled),
            OrderState::Submitted
        );
        assert_eq!(
            OrderState::from_status(BrokerOrderStatus::Unknown),
            OrderState::Submitted
        );
    }

    #[test]
    fn collapsed_state_agrees_with_broker_openness() {
        use BrokerOrderStatus as S;
        let all = [
            S::New,
            S::Accepted,
            S::PendingNew,
            S::PartiallyFilled,
            S::Filled,
            S::DoneForDay,
            S::Canceled,
            S::Expired,
            S::Replaced,
            S::PendingCancel,
            S::PendingReplace,
            S::Rejected,
            S::Suspended,
            S::Stopped,
            S::Held,
            S::Unknown,
        ];
        for s in all {
            assert_eq!(OrderState::from_status(s).is_terminal(), !s.is_open(), "{s:?}");
        }
    }

    #[test]
    fn submitted_reaches_every_terminal() {
        for next in [
            OrderState::Filled,
            OrderState::Canceled,
            OrderState::Rejected,
            OrderState::Expired,
        ] {
            assert_eq!(OrderState::Submitted.advance(next), Ok(next));
        }
        assert_eq!(
            OrderState::Submitted.advance(OrderState::Submitted),
            Ok(OrderState::Submitted)
        );
    }

    #[test]
    fn terminal_states_do_not_move() {
        let err = OrderState::Filled.advance(OrderState::Canceled).unwrap_err();
        assert_eq!(err.from, OrderState::Filled);
        assert_eq!(err.to, OrderState::Canceled);
        assert_eq!(OrderState::Canceled.advance(OrderState::Canceled), Ok(OrderState::Canceled));
    }

    #[test]
    fn only_fill_mutates() {
        assert!(OrderState::Filled.mutates_position());
        assert!(!OrderState::Rejected.mutates_position());
        assert!(!OrderState::Submitted.mutates_position());
    }
}
