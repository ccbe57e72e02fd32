//! Signed and sent transaction records (spec §3).

use crate::request::{BatchId, RequestId};
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gas pricing parameters for a signed transaction (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GasParams {
    /// EIP-1559 (type 2) fee market.
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    /// Legacy fixed gas price.
    Legacy { gas_price: u128 },
}

/// Status of a signed/broadcast transaction, independent of the owning
/// `WithdrawalRequest`'s own status (a batch transaction outlives any one
/// constituent request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignedTxStatus {
    Signed,
    Broadcasting,
    Sent,
    Confirmed,
    Failed,
    /// Superseded by a gas-bumped replacement sharing the same
    /// `(chain_id, from, nonce)` (spec §3 invariant).
    Superseded,
}

/// A single (non-batched) signed EVM transaction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedSingleTransaction {
    pub request_id: RequestId,
    pub raw_signed: Vec<u8>,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub nonce: u64,
    pub gas: GasParams,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub tx_hash: B256,
    pub try_count: u32,
    pub status: SignedTxStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A batched multicall transaction folding several withdrawal requests into
/// one on-chain send (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBatchTransaction {
    pub batch_id: BatchId,
    pub request_ids: Vec<RequestId>,
    pub raw_signed: Vec<u8>,
    pub from: Address,
    /// The Multicall3-style aggregator contract address.
    pub to: Address,
    pub value: U256,
    pub nonce: u64,
    pub gas: GasParams,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub tx_hash: B256,
    pub try_count: u32,
    pub status: SignedTxStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SignedSingleTransaction {
    /// The `(chainId, from, nonce)` tuple that must be unique among
    /// non-superseded signed records (spec §3 invariant).
    pub fn nonce_key(&self) -> (u64, Address, u64) {
        (self.chain_id, self.from, self.nonce)
    }
}

impl SignedBatchTransaction {
    pub fn nonce_key(&self) -> (u64, Address, u64) {
        (self.chain_id, self.from, self.nonce)
    }
}

/// Bookkeeping linking the originally signed transaction hash to the hash
/// actually accepted on-chain (they differ after a gas-bump replacement),
/// plus the receipt data needed to mark a request CONFIRMED (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentTransaction {
    pub original_tx_hash: B256,
    pub accepted_tx_hash: B256,
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    pub block_number: u64,
    pub gas_used: u64,
    pub confirmed_at: DateTime<Utc>,
}
