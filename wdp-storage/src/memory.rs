//! In-memory repository fakes for unit and scenario tests (SPEC_FULL.md §3:
//! "hand-rolled fakes... for `Queue` and the repositories, matching the
//! teacher's preference for real trait objects over mocking frameworks").

use crate::outbox::{OutboxRepo, OutboxRow};
use crate::{SentTxRepo, SignedTxRepo, StorageError, TransactionalInsert, WithdrawalRequestRepo};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;
use wdp_types::{
    BatchId, Chain, Network, RequestId, SentTransaction, SignedBatchTransaction,
    SignedSingleTransaction, SignedTxStatus, WithdrawalRequest, WithdrawalStatus,
};

#[derive(Default)]
pub struct InMemoryStorage {
    requests: DashMap<RequestId, WithdrawalRequest>,
    try_counts: DashMap<RequestId, AtomicU32>,
    single_txs: DashMap<RequestId, SignedSingleTransaction>,
    batch_txs: DashMap<BatchId, SignedBatchTransaction>,
    sent_txs: DashMap<alloy_primitives::B256, SentTransaction>,
    outbox: DashMap<Uuid, OutboxRow>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WithdrawalRequestRepo for InMemoryStorage {
    async fn insert(&self, request: &WithdrawalRequest) -> Result<(), StorageError> {
        self.requests.insert(request.request_id, request.clone());
        self.try_counts
            .insert(request.request_id, AtomicU32::new(request.try_count));
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<WithdrawalRequest, StorageError> {
        self.requests
            .get(&id)
            .map(|r| r.clone())
            .ok_or(StorageError::RequestNotFound(id))
    }

    async fn update_status(
        &self,
        id: RequestId,
        status: WithdrawalStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or(StorageError::RequestNotFound(id))?;
        entry
            .transition_to(status)
            .map_err(|e| StorageError::Conflict(e.to_string()))?;
        entry.error_message = error_message;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn assign_batch(&self, id: RequestId, batch_id: BatchId) -> Result<(), StorageError> {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or(StorageError::RequestNotFound(id))?;
        entry.batch_id = Some(batch_id);
        entry.processing_mode = wdp_types::ProcessingMode::Batch;
        Ok(())
    }

    async fn increment_try_count(&self, id: RequestId) -> Result<u32, StorageError> {
        let counter = self
            .try_counts
            .get(&id)
            .ok_or(StorageError::RequestNotFound(id))?;
        let next = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(mut req) = self.requests.get_mut(&id) {
            req.try_count = next;
        }
        Ok(next)
    }

    async fn list_pending(
        &self,
        chain: Chain,
        network: Network,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>, StorageError> {
        let mut out: Vec<WithdrawalRequest> = self
            .requests
            .iter()
            .filter(|r| {
                r.chain == chain && r.network == network && r.status == WithdrawalStatus::Pending
            })
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait]
impl SignedTxRepo for InMemoryStorage {
    async fn insert_single(&self, tx: &SignedSingleTransaction) -> Result<(), StorageError> {
        self.single_txs.insert(tx.request_id, tx.clone());
        Ok(())
    }

    async fn insert_batch(&self, tx: &SignedBatchTransaction) -> Result<(), StorageError> {
        self.batch_txs.insert(tx.batch_id, tx.clone());
        Ok(())
    }

    async fn get_single(
        &self,
        request_id: RequestId,
    ) -> Result<SignedSingleTransaction, StorageError> {
        self.single_txs
            .get(&request_id)
            .map(|t| t.clone())
            .ok_or_else(|| StorageError::SignedTxNotFound(request_id.to_string()))
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<SignedBatchTransaction, StorageError> {
        self.batch_txs
            .get(&batch_id)
            .map(|t| t.clone())
            .ok_or_else(|| StorageError::SignedTxNotFound(batch_id.to_string()))
    }

    async fn update_single_status(
        &self,
        request_id: RequestId,
        status: SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut tx = self
            .single_txs
            .get_mut(&request_id)
            .ok_or_else(|| StorageError::SignedTxNotFound(request_id.to_string()))?;
        tx.status = status;
        tx.error_message = error_message;
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let mut tx = self
            .batch_txs
            .get_mut(&batch_id)
            .ok_or_else(|| StorageError::SignedTxNotFound(batch_id.to_string()))?;
        tx.status = status;
        tx.error_message = error_message;
        Ok(())
    }

    async fn supersede_single(
        &self,
        old_request_id: RequestId,
        replacement: &SignedSingleTransaction,
    ) -> Result<(), StorageError> {
        if let Some(mut old) = self.single_txs.get_mut(&old_request_id) {
            old.status = SignedTxStatus::Superseded;
        }
        self.single_txs
            .insert(replacement.request_id, replacement.clone());
        Ok(())
    }
}

#[async_trait]
impl SentTxRepo for InMemoryStorage {
    async fn insert(&self, tx: &SentTransaction) -> Result<(), StorageError> {
        self.sent_txs.insert(tx.original_tx_hash, tx.clone());
        Ok(())
    }

    async fn get_by_original_hash(
        &self,
        original_tx_hash: alloy_primitives::B256,
    ) -> Result<Option<SentTransaction>, StorageError> {
        Ok(self.sent_txs.get(&original_tx_hash).map(|t| t.clone()))
    }
}

#[async_trait]
impl OutboxRepo for InMemoryStorage {
    async fn enqueue(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        let id = Uuid::new_v4();
        self.outbox.insert(
            id,
            OutboxRow {
                id,
                queue_name: queue_name.to_string(),
                payload,
                created_at: Utc::now(),
                published_at: None,
            },
        );
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>, StorageError> {
        let mut out: Vec<OutboxRow> = self
            .outbox
            .iter()
            .filter(|r| r.published_at.is_none())
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), StorageError> {
        if let Some(mut row) = self.outbox.get_mut(&id) {
            row.published_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionalInsert for InMemoryStorage {
    async fn insert_request_with_outbox(
        &self,
        request: &WithdrawalRequest,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.insert(request).await?;
        self.enqueue(queue_name, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdp_types::ProcessingMode;

    fn sample_request() -> WithdrawalRequest {
        WithdrawalRequest {
            request_id: RequestId::new(),
            amount: "1.0".to_string(),
            symbol: Some("USDC".to_string()),
            token_address: alloy_primitives::Address::ZERO,
            to_address: alloy_primitives::Address::ZERO,
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

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = InMemoryStorage::new();
        let req = sample_request();
        store.insert(&req).await.unwrap();
        let fetched = store.get(req.request_id).await.unwrap();
        assert_eq!(fetched.request_id, req.request_id);
    }

    #[tokio::test]
    async fn update_status_enforces_the_dag() {
        let store = InMemoryStorage::new();
        let req = sample_request();
        store.insert(&req).await.unwrap();
        let result = store
            .update_status(req.request_id, WithdrawalStatus::Sent, None)
            .await;
        assert!(result.is_err());
        store
            .update_status(req.request_id, WithdrawalStatus::Validating, None)
            .await
            .unwrap();
        let fetched = store.get(req.request_id).await.unwrap();
        assert_eq!(fetched.status, WithdrawalStatus::Validating);
    }

    #[tokio::test]
    async fn list_pending_filters_by_chain_and_status() {
        let store = InMemoryStorage::new();
        let mut pending = sample_request();
        pending.chain = Chain::Ethereum;
        store.insert(&pending).await.unwrap();
        let mut other_chain = sample_request();
        other_chain.chain = Chain::Polygon;
        store.insert(&other_chain).await.unwrap();

        let result = store
            .list_pending(Chain::Ethereum, Network::Mainnet, 10)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].request_id, pending.request_id);
    }

    #[tokio::test]
    async fn outbox_round_trips_and_marks_published() {
        let store = InMemoryStorage::new();
        store
            .enqueue("tx-request", serde_json::json!({"k": "v"}))
            .await
            .unwrap();
        let unpublished = store.fetch_unpublished(10).await.unwrap();
        assert_eq!(unpublished.len(), 1);
        store.mark_published(unpublished[0].id).await.unwrap();
        let unpublished = store.fetch_unpublished(10).await.unwrap();
        assert!(unpublished.is_empty());
    }
}
