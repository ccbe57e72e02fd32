//! Postgres-backed repositories. Alloy types (`Address`, `B256`, `U256`) have
//! no native Postgres encoding, so rows store their hex/decimal string forms
//! and each repository method converts at the row/domain boundary — the same
//! "narrow row type, not `any`" separation the teacher keeps between
//! `ChainsConfig`'s wire shape and its runtime `ProviderMap`.

use crate::outbox::{OutboxRepo, OutboxRow};
use crate::{SentTxRepo, SignedTxRepo, StorageError, TransactionalInsert, WithdrawalRequestRepo};
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;
use wdp_types::{
    BatchId, Chain, GasParams, Network, ProcessingMode, RequestId, SentTransaction,
    SignedBatchTransaction, SignedSingleTransaction, SignedTxStatus, WithdrawalRequest,
    WithdrawalStatus,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn gas_params_to_json(gas: &GasParams) -> serde_json::Value {
    serde_json::to_value(gas).expect("GasParams always serializes")
}

fn gas_params_from_json(value: serde_json::Value) -> Result<GasParams, StorageError> {
    serde_json::from_value(value)
        .map_err(|e| StorageError::Conflict(format!("invalid gas params row: {e}")))
}

fn row_to_request(row: &sqlx::postgres::PgRow) -> Result<WithdrawalRequest, StorageError> {
    let chain: String = row.try_get("chain")?;
    let network: String = row.try_get("network")?;
    let status: String = row.try_get("status")?;
    let mode: String = row.try_get("processing_mode")?;
    let token_address: String = row.try_get("token_address")?;
    let to_address: String = row.try_get("to_address")?;
    let batch_id: Option<Uuid> = row.try_get("batch_id")?;

    Ok(WithdrawalRequest {
        request_id: RequestId(row.try_get("request_id")?),
        amount: row.try_get("amount")?,
        symbol: row.try_get("symbol")?,
        token_address: Address::from_str(&token_address)
            .map_err(|e| StorageError::Conflict(e.to_string()))?,
        to_address: Address::from_str(&to_address)
            .map_err(|e| StorageError::Conflict(e.to_string()))?,
        chain: parse_chain(&chain)?,
        network: parse_network(&network)?,
        status: parse_status(&status)?,
        processing_mode: if mode == "BATCH" {
            ProcessingMode::Batch
        } else {
            ProcessingMode::Single
        },
        batch_id: batch_id.map(BatchId),
        try_count: row.try_get::<i32, _>("try_count")? as u32,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_chain(s: &str) -> Result<Chain, StorageError> {
    Chain::from_str(s).map_err(|e| StorageError::Conflict(e.to_string()))
}

fn parse_network(s: &str) -> Result<Network, StorageError> {
    Network::from_str(s).map_err(|e| StorageError::Conflict(e.to_string()))
}

fn parse_status(s: &str) -> Result<WithdrawalStatus, StorageError> {
    match s {
        "PENDING" => Ok(WithdrawalStatus::Pending),
        "VALIDATING" => Ok(WithdrawalStatus::Validating),
        "SIGNED" => Ok(WithdrawalStatus::Signed),
        "BROADCASTING" => Ok(WithdrawalStatus::Broadcasting),
        "SENT" => Ok(WithdrawalStatus::Sent),
        "CONFIRMED" => Ok(WithdrawalStatus::Confirmed),
        "FAILED" => Ok(WithdrawalStatus::Failed),
        other => Err(StorageError::Conflict(format!("unknown status row: {other}"))),
    }
}

fn parse_signed_status(s: &str) -> Result<SignedTxStatus, StorageError> {
    match s {
        "SIGNED" => Ok(SignedTxStatus::Signed),
        "BROADCASTING" => Ok(SignedTxStatus::Broadcasting),
        "SENT" => Ok(SignedTxStatus::Sent),
        "CONFIRMED" => Ok(SignedTxStatus::Confirmed),
        "FAILED" => Ok(SignedTxStatus::Failed),
        "SUPERSEDED" => Ok(SignedTxStatus::Superseded),
        other => Err(StorageError::Conflict(format!(
            "unknown signed tx status row: {other}"
        ))),
    }
}

#[async_trait]
impl WithdrawalRequestRepo for PostgresStorage {
    async fn insert(&self, request: &WithdrawalRequest) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO withdrawal_requests
                (request_id, amount, symbol, token_address, to_address, chain, network,
                 status, processing_mode, batch_id, try_count, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(request.request_id.0)
        .bind(&request.amount)
        .bind(&request.symbol)
        .bind(request.token_address.to_string())
        .bind(request.to_address.to_string())
        .bind(request.chain.to_string())
        .bind(request.network.to_string())
        .bind(request.status.to_string())
        .bind(match request.processing_mode {
            ProcessingMode::Single => "SINGLE",
            ProcessingMode::Batch => "BATCH",
        })
        .bind(request.batch_id.map(|b| b.0))
        .bind(request.try_count as i32)
        .bind(&request.error_message)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: RequestId) -> Result<WithdrawalRequest, StorageError> {
        let row = sqlx::query("SELECT * FROM withdrawal_requests WHERE request_id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::RequestNotFound(id))?;
        row_to_request(&row)
    }

    async fn update_status(
        &self,
        id: RequestId,
        status: WithdrawalStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        let current = self.get(id).await?;
        if !current.status.can_transition_to(status) {
            return Err(StorageError::Conflict(format!(
                "illegal transition {} -> {status} for {id}",
                current.status
            )));
        }
        sqlx::query(
            "UPDATE withdrawal_requests SET status = $1, error_message = $2, updated_at = $3
             WHERE request_id = $4",
        )
        .bind(status.to_string())
        .bind(&error_message)
        .bind(Utc::now())
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn assign_batch(&self, id: RequestId, batch_id: BatchId) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE withdrawal_requests SET batch_id = $1, processing_mode = 'BATCH'
             WHERE request_id = $2",
        )
        .bind(batch_id.0)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_try_count(&self, id: RequestId) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "UPDATE withdrawal_requests SET try_count = try_count + 1
             WHERE request_id = $1 RETURNING try_count",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::RequestNotFound(id))?;
        Ok(row.try_get::<i32, _>("try_count")? as u32)
    }

    async fn list_pending(
        &self,
        chain: Chain,
        network: Network,
        limit: usize,
    ) -> Result<Vec<WithdrawalRequest>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM withdrawal_requests
             WHERE chain = $1 AND network = $2 AND status = 'PENDING'
             ORDER BY created_at ASC LIMIT $3",
        )
        .bind(chain.to_string())
        .bind(network.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_request).collect()
    }
}

#[async_trait]
impl SignedTxRepo for PostgresStorage {
    async fn insert_single(&self, tx: &SignedSingleTransaction) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO signed_single_transactions
                (request_id, raw_signed, from_address, to_address, value, nonce, gas,
                 gas_limit, chain_id, tx_hash, try_count, status, error_message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(tx.request_id.0)
        .bind(&tx.raw_signed)
        .bind(tx.from.to_string())
        .bind(tx.to.to_string())
        .bind(tx.value.to_string())
        .bind(tx.nonce as i64)
        .bind(gas_params_to_json(&tx.gas))
        .bind(tx.gas_limit as i64)
        .bind(tx.chain_id as i64)
        .bind(tx.tx_hash.to_string())
        .bind(tx.try_count as i32)
        .bind(match tx.status {
            SignedTxStatus::Signed => "SIGNED",
            SignedTxStatus::Broadcasting => "BROADCASTING",
            SignedTxStatus::Sent => "SENT",
            SignedTxStatus::Confirmed => "CONFIRMED",
            SignedTxStatus::Failed => "FAILED",
            SignedTxStatus::Superseded => "SUPERSEDED",
        })
        .bind(&tx.error_message)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_batch(&self, tx: &SignedBatchTransaction) -> Result<(), StorageError> {
        let request_ids: Vec<Uuid> = tx.request_ids.iter().map(|r| r.0).collect();
        sqlx::query(
            "INSERT INTO signed_batch_transactions
                (batch_id, request_ids, raw_signed, from_address, to_address, value, nonce, gas,
                 gas_limit, chain_id, tx_hash, try_count, status, error_message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(tx.batch_id.0)
        .bind(request_ids)
        .bind(&tx.raw_signed)
        .bind(tx.from.to_string())
        .bind(tx.to.to_string())
        .bind(tx.value.to_string())
        .bind(tx.nonce as i64)
        .bind(gas_params_to_json(&tx.gas))
        .bind(tx.gas_limit as i64)
        .bind(tx.chain_id as i64)
        .bind(tx.tx_hash.to_string())
        .bind(tx.try_count as i32)
        .bind(match tx.status {
            SignedTxStatus::Signed => "SIGNED",
            SignedTxStatus::Broadcasting => "BROADCASTING",
            SignedTxStatus::Sent => "SENT",
            SignedTxStatus::Confirmed => "CONFIRMED",
            SignedTxStatus::Failed => "FAILED",
            SignedTxStatus::Superseded => "SUPERSEDED",
        })
        .bind(&tx.error_message)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_single(
        &self,
        request_id: RequestId,
    ) -> Result<SignedSingleTransaction, StorageError> {
        let row = sqlx::query("SELECT * FROM signed_single_transactions WHERE request_id = $1")
            .bind(request_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::SignedTxNotFound(request_id.to_string()))?;

        let from: String = row.try_get("from_address")?;
        let to: String = row.try_get("to_address")?;
        let value: String = row.try_get("value")?;
        let tx_hash: String = row.try_get("tx_hash")?;
        let status: String = row.try_get("status")?;
        let gas: serde_json::Value = row.try_get("gas")?;

        Ok(SignedSingleTransaction {
            request_id,
            raw_signed: row.try_get("raw_signed")?,
            from: Address::from_str(&from).map_err(|e| StorageError::Conflict(e.to_string()))?,
            to: Address::from_str(&to).map_err(|e| StorageError::Conflict(e.to_string()))?,
            value: U256::from_str(&value).map_err(|e| StorageError::Conflict(e.to_string()))?,
            nonce: row.try_get::<i64, _>("nonce")? as u64,
            gas: gas_params_from_json(gas)?,
            gas_limit: row.try_get::<i64, _>("gas_limit")? as u64,
            chain_id: row.try_get::<i64, _>("chain_id")? as u64,
            tx_hash: B256::from_str(&tx_hash).map_err(|e| StorageError::Conflict(e.to_string()))?,
            try_count: row.try_get::<i32, _>("try_count")? as u32,
            status: parse_signed_status(&status)?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<SignedBatchTransaction, StorageError> {
        let row = sqlx::query("SELECT * FROM signed_batch_transactions WHERE batch_id = $1")
            .bind(batch_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::SignedTxNotFound(batch_id.to_string()))?;

        let from: String = row.try_get("from_address")?;
        let to: String = row.try_get("to_address")?;
        let value: String = row.try_get("value")?;
        let tx_hash: String = row.try_get("tx_hash")?;
        let status: String = row.try_get("status")?;
        let gas: serde_json::Value = row.try_get("gas")?;
        let request_ids: Vec<Uuid> = row.try_get("request_ids")?;

        Ok(SignedBatchTransaction {
            batch_id,
            request_ids: request_ids.into_iter().map(RequestId).collect(),
            raw_signed: row.try_get("raw_signed")?,
            from: Address::from_str(&from).map_err(|e| StorageError::Conflict(e.to_string()))?,
            to: Address::from_str(&to).map_err(|e| StorageError::Conflict(e.to_string()))?,
            value: U256::from_str(&value).map_err(|e| StorageError::Conflict(e.to_string()))?,
            nonce: row.try_get::<i64, _>("nonce")? as u64,
            gas: gas_params_from_json(gas)?,
            gas_limit: row.try_get::<i64, _>("gas_limit")? as u64,
            chain_id: row.try_get::<i64, _>("chain_id")? as u64,
            tx_hash: B256::from_str(&tx_hash).map_err(|e| StorageError::Conflict(e.to_string()))?,
            try_count: row.try_get::<i32, _>("try_count")? as u32,
            status: parse_signed_status(&status)?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn update_single_status(
        &self,
        request_id: RequestId,
        status: SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE signed_single_transactions SET status = $1, error_message = $2
             WHERE request_id = $3",
        )
        .bind(format!("{status:?}").to_uppercase())
        .bind(&error_message)
        .bind(request_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_batch_status(
        &self,
        batch_id: BatchId,
        status: SignedTxStatus,
        error_message: Option<String>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE signed_batch_transactions SET status = $1, error_message = $2
             WHERE batch_id = $3",
        )
        .bind(format!("{status:?}").to_uppercase())
        .bind(&error_message)
        .bind(batch_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn supersede_single(
        &self,
        old_request_id: RequestId,
        replacement: &SignedSingleTransaction,
    ) -> Result<(), StorageError> {
        let mut txn = self.pool.begin().await?;
        sqlx::query(
            "UPDATE signed_single_transactions SET status = 'SUPERSEDED' WHERE request_id = $1",
        )
        .bind(old_request_id.0)
        .execute(&mut *txn)
        .await?;
        sqlx::query(
            "INSERT INTO signed_single_transactions
                (request_id, raw_signed, from_address, to_address, value, nonce, gas,
                 gas_limit, chain_id, tx_hash, try_count, status, error_message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(replacement.request_id.0)
        .bind(&replacement.raw_signed)
        .bind(replacement.from.to_string())
        .bind(replacement.to.to_string())
        .bind(replacement.value.to_string())
        .bind(replacement.nonce as i64)
        .bind(gas_params_to_json(&replacement.gas))
        .bind(replacement.gas_limit as i64)
        .bind(replacement.chain_id as i64)
        .bind(replacement.tx_hash.to_string())
        .bind(replacement.try_count as i32)
        .bind("SIGNED")
        .bind(&replacement.error_message)
        .bind(replacement.created_at)
        .execute(&mut *txn)
        .await?;
        txn.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SentTxRepo for PostgresStorage {
    async fn insert(&self, tx: &SentTransaction) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO sent_transactions
                (original_tx_hash, accepted_tx_hash, chain_id, from_address, nonce,
                 block_number, gas_used, confirmed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(tx.original_tx_hash.to_string())
        .bind(tx.accepted_tx_hash.to_string())
        .bind(tx.chain_id as i64)
        .bind(tx.from.to_string())
        .bind(tx.nonce as i64)
        .bind(tx.block_number as i64)
        .bind(tx.gas_used as i64)
        .bind(tx.confirmed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_original_hash(
        &self,
        original_tx_hash: B256,
    ) -> Result<Option<SentTransaction>, StorageError> {
        let row = sqlx::query("SELECT * FROM sent_transactions WHERE original_tx_hash = $1")
            .bind(original_tx_hash.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let accepted: String = row.try_get("accepted_tx_hash")?;
        let from: String = row.try_get("from_address")?;
        Ok(Some(SentTransaction {
            original_tx_hash,
            accepted_tx_hash: B256::from_str(&accepted)
                .map_err(|e| StorageError::Conflict(e.to_string()))?,
            chain_id: row.try_get::<i64, _>("chain_id")? as u64,
            from: Address::from_str(&from).map_err(|e| StorageError::Conflict(e.to_string()))?,
            nonce: row.try_get::<i64, _>("nonce")? as u64,
            block_number: row.try_get::<i64, _>("block_number")? as u64,
            gas_used: row.try_get::<i64, _>("gas_used")? as u64,
            confirmed_at: row.try_get("confirmed_at")?,
        }))
    }
}

#[async_trait]
impl OutboxRepo for PostgresStorage {
    async fn enqueue(
        &self,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO outbox (id, queue_name, payload, created_at, published_at)
             VALUES ($1, $2, $3, $4, NULL)",
        )
        .bind(Uuid::new_v4())
        .bind(queue_name)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM outbox WHERE published_at IS NULL ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                Ok(OutboxRow {
                    id: row.try_get("id")?,
                    queue_name: row.try_get("queue_name")?,
                    payload: row.try_get("payload")?,
                    created_at: row.try_get("created_at")?,
                    published_at: row.try_get("published_at")?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE outbox SET published_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalInsert for PostgresStorage {
    async fn insert_request_with_outbox(
        &self,
        request: &WithdrawalRequest,
        queue_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut txn = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO withdrawal_requests
                (request_id, amount, symbol, token_address, to_address, chain, network,
                 status, processing_mode, batch_id, try_count, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(request.request_id.0)
        .bind(&request.amount)
        .bind(&request.symbol)
        .bind(request.token_address.to_string())
        .bind(request.to_address.to_string())
        .bind(request.chain.to_string())
        .bind(request.network.to_string())
        .bind(request.status.to_string())
        .bind(match request.processing_mode {
            ProcessingMode::Single => "SINGLE",
            ProcessingMode::Batch => "BATCH",
        })
        .bind(request.batch_id.map(|b| b.0))
        .bind(request.try_count as i32)
        .bind(&request.error_message)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *txn)
        .await?;

        sqlx::query(
            "INSERT INTO outbox (id, queue_name, payload, created_at, published_at)
             VALUES ($1, $2, $3, $4, NULL)",
        )
        .bind(Uuid::new_v4())
        .bind(queue_name)
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }
}
