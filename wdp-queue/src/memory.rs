//! An in-memory `Queue` implementation for unit and scenario tests
//! (SPEC_FULL.md §9: scenario tests S1-S7 use this plus repository fakes).

use crate::{dlq_name, Envelope, Queue, QueueError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

struct Stored<T> {
    body: T,
    delivery_count: u32,
}

#[derive(Default)]
struct QueueState<T> {
    ready: VecDeque<Stored<T>>,
    in_flight: std::collections::HashMap<String, Stored<T>>,
}

/// A process-local queue backed by per-queue-name mutex-guarded deques.
/// Delayed redelivery (`nack`) is implemented with a detached `tokio::spawn`
/// timer rather than a real scheduler, sufficient for test determinism when
/// delays are short.
pub struct MemoryQueue<T> {
    queues: DashMap<String, Arc<Mutex<QueueState<T>>>>,
}

impl<T> Default for MemoryQueue<T> {
    fn default() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }
}

impl<T> MemoryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, queue_name: &str) -> Arc<Mutex<QueueState<T>>>
    where
        T: Send + 'static,
    {
        self.queues
            .entry(queue_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(QueueState::default())))
            .clone()
    }
}

#[async_trait]
impl<T> Queue<T> for MemoryQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
{
    async fn send(&self, queue_name: &str, body: &T) -> Result<(), QueueError> {
        let state = self.state(queue_name);
        let mut state = state.lock().await;
        state.ready.push_back(Stored {
            body: body.clone(),
            delivery_count: 0,
        });
        Ok(())
    }

    async fn receive_batch(
        &self,
        queue_name: &str,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<Envelope<T>>, QueueError> {
        let state = self.state(queue_name);
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            {
                let mut state = state.lock().await;
                if !state.ready.is_empty() {
                    let mut out = Vec::with_capacity(max_messages.min(state.ready.len()));
                    for _ in 0..max_messages {
                        let Some(mut msg) = state.ready.pop_front() else {
                            break;
                        };
                        msg.delivery_count += 1;
                        let handle = Uuid::new_v4().to_string();
                        out.push(Envelope {
                            receipt_handle: handle.clone(),
                            body: msg.body.clone(),
                            delivery_count: msg.delivery_count,
                        });
                        state.in_flight.insert(
                            handle,
                            Stored {
                                body: msg.body,
                                delivery_count: msg.delivery_count,
                            },
                        );
                    }
                    return Ok(out);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(10).min(wait)).await;
        }
    }

    async fn ack(&self, queue_name: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let state = self.state(queue_name);
        let mut state = state.lock().await;
        state
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        Ok(())
    }

    async fn nack(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let state = self.state(queue_name);
        let msg = {
            let mut state = state.lock().await;
            state
                .in_flight
                .remove(receipt_handle)
                .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?
        };
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().await;
            state.ready.push_back(msg);
        });
        Ok(())
    }

    async fn send_to_dlq(
        &self,
        queue_name: &str,
        receipt_handle: &str,
        body: &T,
    ) -> Result<(), QueueError> {
        {
            let state = self.state(queue_name);
            let mut state = state.lock().await;
            state.in_flight.remove(receipt_handle);
        }
        let dlq = self.state(&dlq_name(queue_name));
        let mut dlq = dlq.lock().await;
        dlq.ready.push_back(Stored {
            body: body.clone(),
            delivery_count: 0,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_then_receive_round_trips_the_body() {
        let queue: MemoryQueue<String> = MemoryQueue::new();
        queue.send("q", &"hello".to_string()).await.unwrap();
        let batch = queue
            .receive_batch("q", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "hello");
        assert_eq!(batch[0].delivery_count, 1);
    }

    #[tokio::test]
    async fn receive_with_no_messages_times_out_empty() {
        let queue: MemoryQueue<String> = MemoryQueue::new();
        let batch = queue
            .receive_batch("empty", 10, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn nack_redelivers_after_delay_with_incremented_count() {
        let queue: MemoryQueue<String> = MemoryQueue::new();
        queue.send("q", &"payload".to_string()).await.unwrap();
        let first = queue
            .receive_batch("q", 1, Duration::from_millis(50))
            .await
            .unwrap();
        queue
            .nack("q", &first[0].receipt_handle, Duration::from_millis(10))
            .await
            .unwrap();
        let second = queue
            .receive_batch("q", 1, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn send_to_dlq_lands_on_companion_queue() {
        let queue: MemoryQueue<String> = MemoryQueue::new();
        queue.send("q", &"bad".to_string()).await.unwrap();
        let msg = queue
            .receive_batch("q", 1, Duration::from_millis(50))
            .await
            .unwrap();
        queue
            .send_to_dlq("q", &msg[0].receipt_handle, &msg[0].body)
            .await
            .unwrap();
        let dlq_batch = queue
            .receive_batch(&dlq_name("q"), 1, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(dlq_batch.len(), 1);
        assert_eq!(dlq_batch[0].body, "bad");
    }
}
