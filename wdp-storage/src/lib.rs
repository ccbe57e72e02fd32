//! Repository traits and implementations for the durable records in
//! spec.md §3: `withdrawal_requests`, `signed_single_transactions`,
//! `signed_batch_transactions`, `sent_transactions`, plus the outbox table
//! that makes persistence-then-publication effectively atomic (SPEC_FULL.md
//! §5.1).
//!
//! Repositories are narrow traits over typed domain rows, mirroring the
//! teacher's separation of config rows from runtime types (`ProviderCache`
//! vs. `ChainsConfig`) rather than exposing `sqlx::Row` or `serde_json::Value`
//! at the boundary.

pub mod memory;
pub mod outbox;
pub mod postgres;

use async_trait::async_trait;
use wdp_types::{
    BatchId, RequestId, SignedBatchTransaction, SignedSingleTransaction, SentTransaction,
    WithdrawalRequest, WithdrawalStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no withdrawal_requests row for {0}")]
    RequestNotFound(RequestId),
    #[error("no signed transaction row for {0}")]
    SignedTxNotFound(String),
    #[error("concurrent write conflict updating {0}")]
    Conflict(String),
}

/// Persistence for the `withdrawal_requests` table (spec §3).
#[async_trait]
pub trait WithdrawalRequestRepo: Send + Sync {
    async fn insert(&self, request: &WithdrawalRequest) -> Result<(), StorageError>;
    async fn get(&self, id: RequestId) -> Result<WithdrawalRequest, StorageError>;
    async fn update_status(
        &self,
        id: RequestId,
        status: WithdrawalStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError>;
    async fn assign_batch(&self, id: RequestId, batch_id: BatchId) -> Result<(), StorageError>;
    async fn increment_try_count(&self, id: RequestId) -> Result<u32, StorageError>;
    /// Requests currently `PENDING` for a given `(chain, network)`, the
    /// pool the Signing Worker's batching decision draws from (spec §4.2).
    async fn list_pending(
        &self,
        chain: wdp_types::Chain,
        network: wdp_types::Network,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>, StorageError>;
}

/// Persistence for `signed_single_transactions` and
/// `signed_batch_transactions` (spec §3).
#[async_trait]
pub trait SignedTxRepo: Send + Sync {
    async fn insert_single(&self, tx: &SignedSingleTransaction) -> Result<(), StorageError>;
    async fn insert_batch(&self, tx: &SignedBatchTransaction) -> Result<(), StorageError>;
    async fn get_single(
        &self,
        request_id: RequestId,
    ) -> Result<SignedSingleTransaction, StorageError>;
    async fn get_batch(&self, batch_id: BatchId) -> Result<SignedBatchTransaction, StorageError>;
    async fn update_single_status(
        &self,
        request_id: RequestId,
        status: wdp_types::SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError>;
    async fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: wdp_types::SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError>;
    /// Records a gas-bumped replacement, marking the prior record
    /// `SUPERSEDED` while keeping the same `(chain_id, from, nonce)` (spec §3
    /// invariant: uniqueness holds among non-superseded rows only).
    async fn supersede_single(
        &self,
        old_request_id: RequestId,
        replacement: &SignedSingleTransaction,
    ) -> Result<(), StorageError>;
}

/// Persistence for `sent_transactions` (spec §3).
#[async_trait]
pub trait SentTxRepo: Send + Sync {
    async fn insert(&self, tx: &SentTransaction) -> Result<(), StorageError>;
    async fn get_by_original_hash(
        &self,
        original_tx_hash: alloy_primitives::B256,
    ) -> Result<Option<SentTransaction>, StorageError>;
}

/// Inserts a `withdrawal_requests` row and its outbox row together
/// (SPEC_FULL.md §5.1): the Postgres implementation wraps both in one
/// `sqlx` transaction; the in-memory fake does them as two separate writes
/// since tests never observe a partial failure between them.
#[async_trait]
pub trait TransactionalInsert: Send + Sync {
    async fn insert_request_with_outbox(
        &self,
        request: &WithdrawalRequest,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), StorageError>;
}
