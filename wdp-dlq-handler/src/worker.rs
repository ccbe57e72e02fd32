//! Generic DLQ draining (spec §4.5): one function handles any upstream
//! message type, since the classify/retry/fail decision and the
//! `WithdrawalRequest` bookkeeping it drives are identical across
//! `tx-request`, `signed-tx`, and `broadcast-tx` — only how each message
//! type maps onto the request ids it concerns differs.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use wdp_config::RetryConfig;
use wdp_queue::{DlqMessage, Envelope, Queue};
use wdp_storage::WithdrawalRequestRepo;
use wdp_types::{RequestId, WithdrawalStatus};

use crate::backoff::{decide, Decision};
use crate::error::DlqError;

/// The withdrawal request(s) an upstream message concerns, for bumping
/// `tryCount` on retry or marking FAILED on exhaustion.
pub trait RequestIds {
    fn request_ids(&self) -> Vec<RequestId>;
}

impl RequestIds for wdp_types::TxRequestMessage {
    fn request_ids(&self) -> Vec<RequestId> {
        vec![self.request_id]
    }
}

impl RequestIds for wdp_types::SignedTxMessage {
    fn request_ids(&self) -> Vec<RequestId> {
        subject_request_ids(&self.subject)
    }
}

impl RequestIds for wdp_types::BroadcastTxMessage {
    fn request_ids(&self) -> Vec<RequestId> {
        subject_request_ids(&self.subject)
    }
}

fn subject_request_ids(subject: &wdp_types::Subject) -> Vec<RequestId> {
    match subject {
        wdp_types::Subject::Single { request_id } => vec![*request_id],
        wdp_types::Subject::Batch { request_ids, .. } => request_ids.clone(),
    }
}

/// Drains one DLQ delivery: decides retry-vs-fail, applies the
/// corresponding `WithdrawalRequest` bookkeeping, and (on retry) sleeps out
/// the backoff delay before republishing to the original upstream queue —
/// the "park-and-poll" scheduling option spec §4.5 allows, run as one
/// detached task per message the same way the Monitor parks one task per
/// in-flight transaction.
pub async fn process_dlq_message<S, Q, T>(
    storage: &S,
    queue: &Q,
    upstream_queue_name: &str,
    dlq_queue_name: &str,
    envelope: Envelope<DlqMessage<T>>,
    retry_config: &RetryConfig,
) -> Result<(), DlqError>
where
    S: WithdrawalRequestRepo,
    Q: Queue<T> + Queue<DlqMessage<T>>,
    T: RequestIds + Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
{
    let dlq_msg = envelope.body;
    let request_ids = dlq_msg.body.request_ids();

    match decide(dlq_msg.error.kind, dlq_msg.attempts, retry_config) {
        Decision::Retry { delay } => {
            for id in &request_ids {
                storage.increment_try_count(*id).await?;
            }
            info!(
                queue = upstream_queue_name,
                attempts = dlq_msg.attempts,
                delay_ms = delay.as_millis() as u64,
                "scheduling DLQ retry"
            );
            tokio::time::sleep(delay).await;
            Queue::<T>::send(queue, upstream_queue_name, &dlq_msg.body).await?;
        }
        Decision::Fail => {
            warn!(
                queue = upstream_queue_name,
                attempts = dlq_msg.attempts,
                error = %dlq_msg.error,
                "DLQ retry budget exhausted, failing request(s)"
            );
            for id in &request_ids {
                storage
                    .update_status(*id, WithdrawalStatus::Failed, Some(dlq_msg.error.message.clone()))
                    .await?;
            }
        }
    }

    Queue::<DlqMessage<T>>::ack(queue, dlq_queue_name, &envelope.receipt_handle).await?;
    Ok(())
}
