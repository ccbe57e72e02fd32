//! Withdrawal status DAG (spec §3 invariant, property P1/P4).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a [`crate::request::WithdrawalRequest`].
///
/// Transitions are monotone along the DAG:
/// `PENDING -> VALIDATING -> {SIGNED|FAILED} -> {BROADCASTING|FAILED} -> {SENT|FAILED} -> {CONFIRMED|FAILED}`.
/// `CONFIRMED` and `FAILED` are absorbing (property P4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Validating,
    Signed,
    Broadcasting,
    Sent,
    Confirmed,
    Failed,
}

impl WithdrawalStatus {
    /// Whether this status is absorbing — no further mutation is allowed
    /// once a request reaches it (property P4).
    pub fn is_terminal(self) -> bool {
        matches!(self, WithdrawalStatus::Confirmed | WithdrawalStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self` along the status DAG.
    /// `FAILED` is reachable from any non-terminal status (a request can
    /// fail at any stage); every other edge is the single forward step.
    pub fn can_transition_to(self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Validating)
                | (Validating, Signed)
                | (Signed, Broadcasting)
                | (Broadcasting, Sent)
                | (Sent, Confirmed)
        )
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Validating => "VALIDATING",
            WithdrawalStatus::Signed => "SIGNED",
            WithdrawalStatus::Broadcasting => "BROADCASTING",
            WithdrawalStatus::Sent => "SENT",
            WithdrawalStatus::Confirmed => "CONFIRMED",
            WithdrawalStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Whether a request is processed alone or folded into a batch (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingMode {
    Single,
    Batch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use WithdrawalStatus::*;

    #[test]
    fn forward_path_is_legal() {
        assert!(Pending.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Signed));
        assert!(Signed.can_transition_to(Broadcasting));
        assert!(Broadcasting.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Confirmed));
    }

    #[test]
    fn failure_reachable_from_any_non_terminal_state() {
        for s in [Pending, Validating, Signed, Broadcasting, Sent] {
            assert!(s.can_transition_to(Failed));
        }
    }

    #[test]
    fn terminal_states_absorb() {
        assert!(Confirmed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn skipping_a_stage_is_illegal() {
        assert!(!Pending.can_transition_to(Signed));
        assert!(!Validating.can_transition_to(Sent));
    }
}
