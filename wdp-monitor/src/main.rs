//! Monitor binary: consumes `broadcast-tx` and spawns one independent
//! polling loop per transaction, each running until CONFIRMED or FAILED
//! (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::{error, info, instrument, warn};
use wdp_chain::ProviderCache;
use wdp_config::Config;
use wdp_monitor::{monitor_transaction, MonitorContext, MonitorOutcome};
use wdp_observability::{SigDown, Telemetry};
use wdp_queue::redis_queue::RedisQueue;
use wdp_queue::Queue;
use wdp_storage::postgres::PostgresStorage;
use wdp_types::BroadcastTxMessage;

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

    let providers = ProviderCache::from_configs(&config.chains).await?;
    let ctx = Arc::new(MonitorContext {
        providers,
        config: config.clone(),
    });
    let config = Arc::new(config);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let receive_handle = tokio::spawn(run_receive_loop(storage, queue, ctx, config.clone(), cancellation.clone()));

    sig_down.recv().await;
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if tokio::time::timeout(grace, receive_handle).await.is_err() {
        warn!("shutdown grace period elapsed with monitoring tasks still in flight");
    }
    info!("monitor shut down");
    Ok(())
}

#[instrument(skip_all)]
async fn run_receive_loop(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    ctx: Arc<MonitorContext>,
    config: Arc<Config>,
    cancellation: tokio_util::sync::CancellationToken,
) {
    let wait = Duration::from_secs(config.long_poll_secs);
    loop {
        if cancellation.is_cancelled() {
            return;
        }
        let batch = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            result = Queue::<BroadcastTxMessage>::receive_batch(
                queue.as_ref(),
                BROADCAST_TX_QUEUE,
                config.receive_batch_size,
                wait,
            ) => result,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to receive from broadcast-tx queue");
                continue;
            }
        };

        for envelope in batch {
            let storage = storage.clone();
            let queue = queue.clone();
            let ctx = ctx.clone();
            // Detached: a monitoring loop can run far longer than any grace
            // period, and its only state is in-memory, so a process restart
            // simply lets the queue's visibility timeout redeliver the
            // message to a fresh task rather than requiring a clean join.
            tokio::spawn(async move {
                let outcome = monitor_transaction(storage.as_ref(), ctx.as_ref(), &envelope.body).await;
                match outcome {
                    Ok(MonitorOutcome::Confirmed) | Ok(MonitorOutcome::Failed(_)) => {
                        let _ = Queue::<BroadcastTxMessage>::ack(queue.as_ref(), BROADCAST_TX_QUEUE, &envelope.receipt_handle)
                            .await
                            .map_err(|e| warn!(error = %e, "ack failed"));
                    }
                    Err(e) => {
                        warn!(error = %e, "monitor failed transiently, nacking for retry");
                        let _ = Queue::<BroadcastTxMessage>::nack(
                            queue.as_ref(),
                            BROADCAST_TX_QUEUE,
                            &envelope.receipt_handle,
                            Duration::from_secs(5),
                        )
                        .await
                        .map_err(|e| warn!(error = %e, "nack failed"));
                    }
                }
            });
        }
    }
}
