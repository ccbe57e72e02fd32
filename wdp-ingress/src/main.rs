//! Ingress worker binary: consumes `intake` (populated by whatever
//! front-end exists; out of scope per spec §1) and admits each request into
//! the pipeline via [`wdp_ingress::submit`]. A background task flushes the
//! outbox so a crash between persist and publish cannot lose the message
//! (spec §4.1).

use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use wdp_config::Config;
use wdp_ingress::intake::IntakeRequest;
use wdp_observability::{SigDown, Telemetry};
use wdp_queue::redis_queue::RedisQueue;
use wdp_queue::Queue;
use wdp_storage::outbox::OutboxRepo;
use wdp_storage::postgres::PostgresStorage;
use wdp_types::HasErrorKind;

const INTAKE_QUEUE: &str = "intake";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Arc::new(Config::load()?);
    let storage = Arc::new(PostgresStorage::connect(&config.store.database_url).await?);
    let queue = Arc::new(RedisQueue::open(config.store.redis_url.as_str())?);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let outbox_handle = tokio::spawn(flush_outbox(
        storage.clone(),
        queue.clone(),
        cancellation.clone(),
    ));
    let intake_handle = tokio::spawn(run_intake_loop(
        storage,
        queue,
        config,
        cancellation.clone(),
    ));

    sig_down.recv().await;
    let _ = tokio::join!(outbox_handle, intake_handle);
    info!("ingress shut down");
    Ok(())
}

#[instrument(skip_all)]
async fn run_intake_loop(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
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
            result = Queue::<IntakeRequest>::receive_batch(
                queue.as_ref(),
                INTAKE_QUEUE,
                config.receive_batch_size,
                wait,
            ) => result,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to receive from intake queue");
                continue;
            }
        };
        for envelope in batch {
            let outcome = wdp_ingress::submit(storage.as_ref(), &config, envelope.body).await;
            match outcome {
                Ok(request_id) => {
                    info!(%request_id, "admitted withdrawal request");
                    let _ = Queue::<IntakeRequest>::ack(
                        queue.as_ref(),
                        INTAKE_QUEUE,
                        &envelope.receipt_handle,
                    )
                    .await
                    .map_err(|e| warn!(error = %e, "ack failed"));
                }
                Err(e) if e.kind().is_terminal_for_message() => {
                    warn!(error = %e, "rejecting intake message, no retry");
                    let _ = Queue::<IntakeRequest>::ack(
                        queue.as_ref(),
                        INTAKE_QUEUE,
                        &envelope.receipt_handle,
                    )
                    .await
                    .map_err(|e| warn!(error = %e, "ack failed"));
                }
                Err(e) => {
                    warn!(error = %e, "transient failure admitting request, nacking");
                    let _ = Queue::<IntakeRequest>::nack(
                        queue.as_ref(),
                        INTAKE_QUEUE,
                        &envelope.receipt_handle,
                        Duration::from_secs(1),
                    )
                    .await
                    .map_err(|e| warn!(error = %e, "nack failed"));
                }
            }
        }
    }
}

/// Republishes outbox rows left over from a crash between the `INSERT` and
/// the original publish attempt (spec §4.1 "a retrying outbox must
/// eventually publish exactly once").
#[instrument(skip_all)]
async fn flush_outbox(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    cancellation: tokio_util::sync::CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(2));
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            _ = interval.tick() => {}
        }
        let rows = match storage.fetch_unpublished(100).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to read outbox");
                continue;
            }
        };
        for row in rows {
            let send_result = Queue::<serde_json::Value>::send(queue.as_ref(), &row.queue_name, &row.payload).await;
            match send_result {
                Ok(()) => {
                    if let Err(e) = storage.mark_published(row.id).await {
                        error!(error = %e, "failed to mark outbox row published");
                    }
                }
                Err(e) => warn!(error = %e, "failed to publish outbox row, will retry"),
            }
        }
    }
}
