//! The durable at-least-once queue abstraction connecting Ingress, the
//! Signing Worker, the Broadcast Worker, the Monitor, and DLQ Handlers
//! (spec.md §2, §5). Concrete transport is deliberately out of scope
//! (spec.md §1); this crate is the seam, plus one in-memory and one
//! Redis-backed implementation so the workspace is runnable without a
//! specific vendor bus.

pub mod memory;
pub mod redis_queue;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("receipt handle not found or already acknowledged: {0}")]
    UnknownReceipt(String),
}

/// A delivered message plus the bookkeeping needed to ack/nack it.
///
/// `receipt_handle` identifies this specific delivery, not the message body
/// itself, matching at-least-once semantics: redelivery issues a new handle.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub receipt_handle: String,
    pub body: T,
    /// Number of times this message has been delivered, including this one.
    /// Workers compare this against retry-policy attempt limits (spec §4.5).
    pub delivery_count: u32,
}

/// A durable, at-least-once message queue with a companion DLQ per logical
/// queue name (spec.md §2: "connected via durable at-least-once queues with
/// companion DLQs").
#[async_trait]
pub trait Queue<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Publishes a message onto `queue_name`.
    async fn send(&self, queue_name: &str, body: &T) -> Result<(), QueueError>;

    /// Long-polls `queue_name` for up to `max_messages`, waiting up to
    /// `wait` for at least one message before returning an empty batch
    /// (spec §4.2: "receive-batch with long-poll").
    async fn receive_batch(
        &self,
        queue_name: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope<T>>, QueueError>;

    /// Permanently removes a message after successful processing.
    async fn ack(&self, queue_name: &str, receipt_handle: &str) -> Result<(), QueueError>;

    /// Makes a message visible again after `delay`, incrementing its
    /// delivery count (spec §4.5: retry backoff schedule).
    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        delay: Duration,
    ) -> Result<(), QueueError>;

    /// Escalates a message to `queue_name`'s companion DLQ, removing it from
    /// the source queue (spec §4.5).
    async fn send_to_dlq(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        body: &T,
    ) -> Result<(), QueueError>;
}

/// Conventional DLQ name for a given logical queue, mirroring spec.md's
/// "companion DLQ" phrasing.
pub fn dlq_name(queue_name: &str) -> String {
    format!("{queue_name}.dlq")
}
