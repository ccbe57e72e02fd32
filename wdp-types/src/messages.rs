//! Wire payloads for the pipeline's queues (spec §6).

use crate::chain::{Chain, Network};
use crate::error::ErrorDetail;
use crate::request::{BatchId, RequestId};
use crate::signed_tx::GasParams;
use alloy_primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies whether a message concerns a single request or a batch,
/// carried explicitly on every envelope after `tx-request` (spec §6,
/// §9 open question: "explicit `chain`+`network` in every `signed-tx` and
/// `broadcast-tx` envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Subject {
    Single { request_id: RequestId },
    Batch {
        batch_id: BatchId,
        request_ids: Vec<RequestId>,
    },
}

/// Payload of the `tx-request` queue (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRequestMessage {
    pub request_id: RequestId,
    pub amount: String,
    pub symbol: Option<String>,
    pub to_address: Address,
    pub token_address: Address,
    pub chain: Chain,
    pub network: Network,
    pub created_at: DateTime<Utc>,
}

/// Payload of the `signed-tx` queue (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTxMessage {
    pub subject: Subject,
    pub chain: Chain,
    pub network: Network,
    pub from: Address,
    pub nonce: u64,
    pub raw_transaction: Vec<u8>,
    pub tx_hash: B256,
    pub to: Address,
    pub value: U256,
    /// The call data underlying `raw_transaction`, carried alongside the
    /// already-encoded bytes so the Broadcast Worker can re-sign with bumped
    /// gas params on an underpriced/stuck replacement (spec §4.3) without
    /// having to decode the RLP envelope.
    pub data: Bytes,
    pub gas: GasParams,
    pub gas_limit: u64,
}

/// Payload of the `broadcast-tx` queue (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastTxMessage {
    pub subject: Subject,
    pub chain: Chain,
    pub network: Network,
    pub tx_hash: B256,
    pub from: Address,
    pub nonce: u64,
}

/// Wraps an upstream message body with the failure context needed by the
/// DLQ handler to classify and (maybe) reschedule it (spec §6: "same body
/// as upstream plus `{errorKind, errorMessage, attempts}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqMessage<T> {
    pub body: T,
    pub error: ErrorDetail,
    pub attempts: u32,
}
