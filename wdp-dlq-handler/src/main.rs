//! DLQ Handler binary: drains each companion DLQ, classifies its messages,
//! and reschedules or permanently fails the underlying request(s)
//! (spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use wdp_config::{Config, RetryConfig};
use wdp_dlq_handler::{process_dlq_message, RequestIds};
use wdp_observability::{SigDown, Telemetry};
use wdp_queue::redis_queue::RedisQueue;
use wdp_queue::{dlq_name, DlqMessage, Queue};
use wdp_storage::postgres::PostgresStorage;
use wdp_types::{BroadcastTxMessage, SignedTxMessage, TxRequestMessage};

const TX_REQUEST_QUEUE: &str = "tx-request";
const SIGNED_TX_QUEUE: &str = "signed-tx";
const BROADCAST_TX_QUEUE: &str = "broadcast-tx";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let storage = Arc::new(PostgresStorage::connect(&config.store.database_url).await?);
    let queue = Arc::new(RedisQueue::open(config.store.redis_url.as_str())?);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();
    let wait = Duration::from_secs(config.long_poll_secs);
    let batch_size = config.receive_batch_size;
    let retry = config.retry;

    let tx_request_handle = tokio::spawn(run_dlq_loop::<TxRequestMessage>(
        storage.clone(),
        queue.clone(),
        TX_REQUEST_QUEUE,
        retry,
        batch_size,
        wait,
        cancellation.clone(),
    ));
    let signed_tx_handle = tokio::spawn(run_dlq_loop::<SignedTxMessage>(
        storage.clone(),
        queue.clone(),
        SIGNED_TX_QUEUE,
        retry,
        batch_size,
        wait,
        cancellation.clone(),
    ));
    let broadcast_tx_handle = tokio::spawn(run_dlq_loop::<BroadcastTxMessage>(
        storage,
        queue,
        BROADCAST_TX_QUEUE,
        retry,
        batch_size,
        wait,
        cancellation.clone(),
    ));

    sig_down.recv().await;
    let _ = tokio::join!(tx_request_handle, signed_tx_handle, broadcast_tx_handle);
    tracing::info!("dlq handler shut down");
    Ok(())
}

#[instrument(skip_all, fields(dlq = upstream_queue_name))]
async fn run_dlq_loop<T>(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    upstream_queue_name: &'static str,
    retry_config: RetryConfig,
    batch_size: usize,
    wait: Duration,
    cancellation: CancellationToken,
) where
    T: RequestIds + Serialize + DeserializeOwned + Send + Sync + Clone + 'static,
{
    let dlq_queue_name = dlq_name(upstream_queue_name);
    loop {
        if cancellation.is_cancelled() {
            return;
        }
        let batch = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            result = Queue::<DlqMessage<T>>::receive_batch(queue.as_ref(), &dlq_queue_name, batch_size, wait) => result,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, dlq = %dlq_queue_name, "failed to receive from DLQ");
                continue;
            }
        };

        for envelope in batch {
            let storage = storage.clone();
            let queue = queue.clone();
            let dlq_queue_name = dlq_queue_name.clone();
            tokio::spawn(async move {
                if let Err(e) = process_dlq_message(
                    storage.as_ref(),
                    queue.as_ref(),
                    upstream_queue_name,
                    &dlq_queue_name,
                    envelope,
                    &retry_config,
                )
                .await
                {
                    warn!(error = %e, dlq = %dlq_queue_name, "failed to process DLQ message, leaving unacked for redelivery");
                }
            });
        }
    }
}
