//! Signing Worker binary: consumes `tx-request`, partitions each
//! receive-cycle batch by `(chain, network, tokenAddress)`, decides
//! SINGLE-vs-BATCH per group, signs, and emits `signed-tx` (spec §4.2).

use dotenvy::dotenv;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use wdp_chain::{FeeCache, ProviderCache, SignerSet};
use wdp_config::Config;
use wdp_nonce::NonceCoordinator;
use wdp_observability::{SigDown, Telemetry};
use wdp_queue::redis_queue::RedisQueue;
use wdp_queue::{Envelope, Queue};
use wdp_signing_worker::{group_by_token, partition_group, sign_batch, sign_single, SigningContext};
use wdp_storage::postgres::PostgresStorage;
use wdp_types::{HasErrorKind, RequestId, SignedTxMessage, TxRequestMessage, NATIVE_TOKEN_SENTINEL};

const TX_REQUEST_QUEUE: &str = "tx-request";
const SIGNED_TX_QUEUE: &str = "signed-tx";

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
    let redis_client = redis::Client::open(config.store.redis_url.as_str())?;

    let providers = ProviderCache::from_configs(&config.chains).await?;
    let signers = SignerSet::from_configs(&config.chains)?;
    let ctx = Arc::new(SigningContext {
        providers,
        signers,
        fees: FeeCache::new(),
        nonces: NonceCoordinator::new(redis_client),
        config: config.clone(),
    });
    let config = Arc::new(config);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let handle = tokio::spawn(run_signing_loop(
        storage,
        queue,
        ctx,
        config,
        cancellation.clone(),
    ));

    sig_down.recv().await;
    let _ = handle.await;
    info!("signing worker shut down");
    Ok(())
}

#[instrument(skip_all)]
async fn run_signing_loop(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    ctx: Arc<SigningContext>,
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
            result = Queue::<TxRequestMessage>::receive_batch(
                queue.as_ref(),
                TX_REQUEST_QUEUE,
                config.receive_batch_size,
                wait,
            ) => result,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to receive from tx-request queue");
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }

        let groups = group_by_token(batch.iter().map(|e| e.body.clone()).collect());
        let mut by_id: HashMap<RequestId, Envelope<TxRequestMessage>> =
            batch.into_iter().map(|e| (e.body.request_id, e)).collect();

        for ((chain, network, token_address), messages) in groups {
            let is_native = token_address == NATIVE_TOKEN_SENTINEL;
            let gas_limit_cap = config
                .chain(chain, network)
                .map(|c| c.batch_gas_limit_cap)
                .unwrap_or(u64::MAX);

            let (singles, maybe_batch) =
                partition_group(messages, is_native, gas_limit_cap, &config.batching);

            for msg in &singles {
                let Some(envelope) = by_id.remove(&msg.request_id) else {
                    continue;
                };
                let outcome = sign_single(storage.as_ref(), ctx.as_ref(), msg).await;
                finish_one(queue.as_ref(), envelope, outcome).await;
            }

            if let Some(group) = maybe_batch {
                let request_ids: Vec<RequestId> = group.iter().map(|m| m.request_id).collect();
                let outcome = sign_batch(storage.as_ref(), ctx.as_ref(), &group).await;
                let envelopes: Vec<Envelope<TxRequestMessage>> = request_ids
                    .iter()
                    .filter_map(|id| by_id.remove(id))
                    .collect();
                finish_group(queue.as_ref(), envelopes, outcome).await;
            }
        }
    }
}

/// Acks/nacks one `tx-request` message and, on success, emits the signed
/// transaction onward (spec §4.2: "failures: validation -> FAILED+ack;
/// transient -> release nonce + nack").
async fn finish_one(
    queue: &RedisQueue,
    envelope: Envelope<TxRequestMessage>,
    outcome: Result<SignedTxMessage, wdp_signing_worker::SigningError>,
) {
    match outcome {
        Ok(signed) => {
            if let Err(e) = Queue::<SignedTxMessage>::send(queue, SIGNED_TX_QUEUE, &signed).await {
                error!(error = %e, "failed to publish signed-tx, leaving tx-request unacked");
                return;
            }
            let _ = Queue::<TxRequestMessage>::ack(queue, TX_REQUEST_QUEUE, &envelope.receipt_handle)
                .await
                .map_err(|e| warn!(error = %e, "ack failed"));
        }
        Err(e) if e.kind().is_terminal_for_message() => {
            warn!(error = %e, "rejecting tx-request, no retry");
            let _ = Queue::<TxRequestMessage>::ack(queue, TX_REQUEST_QUEUE, &envelope.receipt_handle)
                .await
                .map_err(|e| warn!(error = %e, "ack failed"));
        }
        Err(e) => {
            warn!(error = %e, "transient failure signing request, nacking");
            let _ = Queue::<TxRequestMessage>::nack(
                queue,
                TX_REQUEST_QUEUE,
                &envelope.receipt_handle,
                Duration::from_secs(1),
            )
            .await
            .map_err(|e| warn!(error = %e, "nack failed"));
        }
    }
}

/// Same as [`finish_one`] but for every constituent message of one signed
/// batch transaction, which succeeds or fails as a unit.
async fn finish_group(
    queue: &RedisQueue,
    envelopes: Vec<Envelope<TxRequestMessage>>,
    outcome: Result<SignedTxMessage, wdp_signing_worker::SigningError>,
) {
    match outcome {
        Ok(signed) => {
            if let Err(e) = Queue::<SignedTxMessage>::send(queue, SIGNED_TX_QUEUE, &signed).await {
                error!(error = %e, "failed to publish signed-tx batch, leaving tx-request unacked");
                return;
            }
            for envelope in envelopes {
                let _ = Queue::<TxRequestMessage>::ack(queue, TX_REQUEST_QUEUE, &envelope.receipt_handle)
                    .await
                    .map_err(|e| warn!(error = %e, "ack failed"));
            }
        }
        Err(e) if e.kind().is_terminal_for_message() => {
            warn!(error = %e, "rejecting batch, no retry");
            for envelope in envelopes {
                let _ = Queue::<TxRequestMessage>::ack(queue, TX_REQUEST_QUEUE, &envelope.receipt_handle)
                    .await
                    .map_err(|e| warn!(error = %e, "ack failed"));
            }
        }
        Err(e) => {
            warn!(error = %e, "transient failure signing batch, nacking");
            for envelope in envelopes {
                let _ = Queue::<TxRequestMessage>::nack(
                    queue,
                    TX_REQUEST_QUEUE,
                    &envelope.receipt_handle,
                    Duration::from_secs(1),
                )
                .await
                .map_err(|e| warn!(error = %e, "nack failed"));
            }
        }
    }
}
