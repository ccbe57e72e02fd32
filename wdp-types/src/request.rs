//! `WithdrawalRequest` and related durable identifiers (spec §3).

use crate::chain::{Chain, Network};
use crate::status::{ProcessingMode, WithdrawalStatus};
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A withdrawal request's stable identifier, a UUID v4 as required by spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a [`crate::signed_tx::SignedBatchTransaction`], shared by
/// every constituent `WithdrawalRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The zero address, used as the sentinel for native-token withdrawals
/// (spec §3: "`tokenAddress` ... or zero for native").
pub const NATIVE_TOKEN_SENTINEL: Address = Address::ZERO;

/// The durable `WithdrawalRequest` record (spec §3). Created by Ingress,
/// mutated by whichever worker currently owns the lifecycle stage, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub request_id: RequestId,
    /// Decimal string as submitted, e.g. `"0.5"`.
    pub amount: String,
    pub symbol: Option<String>,
    pub token_address: Address,
    pub to_address: Address,
    pub chain: Chain,
    pub network: Network,
    pub status: WithdrawalStatus,
    pub processing_mode: ProcessingMode,
    pub batch_id: Option<BatchId>,
    pub try_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    /// Whether this request's `token_address` denotes the chain's native
    /// asset (spec §3: zero address sentinel).
    pub fn is_native(&self) -> bool {
        self.token_address == NATIVE_TOKEN_SENTINEL
    }

    /// Attempts the status transition, enforcing the DAG invariant (spec §3;
    /// property P1). Returns an error describing the illegal edge instead of
    /// mutating on failure.
    pub fn transition_to(&mut self, next: WithdrawalStatus) -> Result<(), IllegalTransition> {
        if !self.status.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal status transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub from: WithdrawalStatus,
    pub to: WithdrawalStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WithdrawalRequest {
        WithdrawalRequest {
            request_id: RequestId::new(),
            amount: "0.5".to_string(),
            symbol: None,
            token_address: NATIVE_TOKEN_SENTINEL,
            to_address: Address::ZERO,
            chain: Chain::Polygon,
            network: Network::Mainnet,
            status: WithdrawalStatus::Pending,
            processing_mode: ProcessingMode::Single,
            batch_id: None,
            try_count: 0,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn native_sentinel_detected() {
        assert!(sample().is_native());
    }

    #[test]
    fn transition_mutates_on_success() {
        let mut req = sample();
        req.transition_to(WithdrawalStatus::Validating).unwrap();
        assert_eq!(req.status, WithdrawalStatus::Validating);
    }

    #[test]
    fn transition_rejects_illegal_edge() {
        let mut req = sample();
        assert!(req.transition_to(WithdrawalStatus::Sent).is_err());
        assert_eq!(req.status, WithdrawalStatus::Pending);
    }
}
