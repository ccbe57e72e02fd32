//! The outbox pattern resolving spec.md §9's open question: "if the enqueue
//! step fails after the DB write commits... a retrying outbox must
//! eventually publish exactly once." A row lands in the same transaction as
//! the domain write; a background flusher publishes it and marks it done,
//! so publication is at-least-once without a distributed transaction across
//! Postgres and the queue.

use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OutboxRepo: Send + Sync {
    /// Inserts a pending outbox row, ideally in the same transaction as the
    /// domain write that produced `payload` (the Postgres implementation
    /// exposes a transactional variant; callers outside a transaction get
    /// an isolated commit here, which the flusher still makes eventually
    /// consistent).
    async fn enqueue(&self, queue_name: &str, payload: serde_json::Value) -> Result<(), StorageError>;

    /// Rows not yet published, oldest first, for the flusher to publish.
    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>, StorageError>;

    async fn mark_published(&self, id: Uuid) -> Result<(), StorageError>;
}
