//! Broadcast Worker binary: consumes `signed-tx`, orders each `(chainId,
//! signer)`'s transactions by nonce, submits them to the chain, heals gaps,
//! and emits `broadcast-tx` (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::{error, info, instrument, warn};
use wdp_broadcast_worker::{
    drain_pending, enqueue_and_drain, gap_has_timed_out, issue_gap_filler, BroadcastContext, BroadcastRegistry,
    DrainOutcome,
};
use wdp_chain::{FeeCache, ProviderCache, SignerSet};
use wdp_config::Config;
use wdp_nonce::NonceCoordinator;
use wdp_observability::{SigDown, Telemetry};
use wdp_queue::redis_queue::RedisQueue;
use wdp_queue::Queue;
use wdp_storage::postgres::PostgresStorage;
use wdp_types::{BroadcastTxMessage, SignedTxMessage};

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
    let redis_client = redis::Client::open(config.store.redis_url.as_str())?;

    let providers = ProviderCache::from_configs(&config.chains).await?;
    let signers = SignerSet::from_configs(&config.chains)?;
    let ctx = Arc::new(BroadcastContext {
        providers,
        signers,
        fees: FeeCache::new(),
        nonces: NonceCoordinator::new(redis_client),
        config: config.clone(),
        registry: BroadcastRegistry::new(),
    });
    rehydrate_broadcast_state(&ctx, &config).await;
    let config = Arc::new(config);

    let sig_down = SigDown::try_new()?;
    let cancellation = sig_down.cancellation_token();

    let receive_handle = tokio::spawn(run_receive_loop(
        storage.clone(),
        queue.clone(),
        ctx.clone(),
        config.clone(),
        cancellation.clone(),
    ));
    let sweep_handle = tokio::spawn(run_gap_sweep_loop(
        storage,
        queue,
        ctx,
        config,
        cancellation.clone(),
    ));

    sig_down.recv().await;
    let _ = tokio::join!(receive_handle, sweep_handle);
    info!("broadcast worker shut down");
    Ok(())
}

/// Restores every configured `(chain, signer)` key's broadcast ordering
/// state from the nonce coordinator's Redis store before accepting any
/// `signed-tx` deliveries (spec §3/§5: crash recovery and cross-process
/// sharing of `lastBroadcastedNonce`/`pendingList`).
#[instrument(skip_all)]
async fn rehydrate_broadcast_state(ctx: &BroadcastContext, config: &Config) {
    for chain_config in &config.chains {
        let chain_net = wdp_types::ChainNetwork::new(chain_config.chain, chain_config.network);
        let chain_id = chain_net.evm_chain_id();
        let addresses = match ctx.signers.addresses(chain_config.chain, chain_config.network) {
            Ok(addresses) => addresses,
            Err(e) => {
                error!(error = %e, "failed to enumerate signer addresses for rehydration");
                continue;
            }
        };
        for address in addresses {
            let (last, records) = match ctx.nonces.load_broadcast_state(chain_id, address).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!(error = %e, %address, "failed to load persisted broadcast state");
                    continue;
                }
            };
            let pending = records
                .into_iter()
                .filter_map(|(nonce, json)| match serde_json::from_str::<SignedTxMessage>(&json) {
                    Ok(msg) => Some((nonce, msg)),
                    Err(e) => {
                        error!(error = %e, nonce, "failed to parse persisted pendingList record, skipping");
                        None
                    }
                })
                .collect();
            if last.is_some() {
                info!(%address, chain_id, last_broadcasted = ?last, "rehydrated broadcast state");
            }
            ctx.registry.rehydrate(chain_id, address, last, pending).await;
        }
    }
}

#[instrument(skip_all)]
async fn run_receive_loop(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    ctx: Arc<BroadcastContext>,
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
            result = Queue::<SignedTxMessage>::receive_batch(
                queue.as_ref(),
                SIGNED_TX_QUEUE,
                config.receive_batch_size,
                wait,
            ) => result,
        };
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to receive from signed-tx queue");
                continue;
            }
        };

        for envelope in batch {
            let outcome = enqueue_and_drain(
                storage.as_ref(),
                ctx.as_ref(),
                envelope.body,
                envelope.receipt_handle,
            )
            .await;
            apply_outcome(queue.as_ref(), outcome).await;
        }
    }
}

/// Publishes every successfully broadcast message and acks its originating
/// `signed-tx` delivery; acks deliveries whose request already reached
/// terminal FAILED (nonce already released, nothing left to do); nacks the
/// stalled head, if any, for retry (spec §4.3, §7).
async fn apply_outcome(queue: &RedisQueue, outcome: DrainOutcome) {
    for (receipt_handle, broadcast_msg) in outcome.broadcasted {
        if let Err(e) = Queue::<BroadcastTxMessage>::send(queue, BROADCAST_TX_QUEUE, &broadcast_msg).await {
            error!(error = %e, "failed to publish broadcast-tx, leaving signed-tx unacked");
            continue;
        }
        let _ = Queue::<SignedTxMessage>::ack(queue, SIGNED_TX_QUEUE, &receipt_handle)
            .await
            .map_err(|e| warn!(error = %e, "ack failed"));
    }

    for receipt_handle in outcome.failed {
        let _ = Queue::<SignedTxMessage>::ack(queue, SIGNED_TX_QUEUE, &receipt_handle)
            .await
            .map_err(|e| warn!(error = %e, "ack failed"));
    }

    if let Some((receipt_handle, err)) = outcome.stalled {
        warn!(error = %err, "transient broadcast failure, nacking for retry");
        let _ = Queue::<SignedTxMessage>::nack(queue, SIGNED_TX_QUEUE, &receipt_handle, Duration::from_secs(1))
            .await
            .map_err(|e| warn!(error = %e, "nack failed"));
    }
}

/// Periodically checks every known `(chainId, signer)` key for a gap older
/// than `NonceConfig::gap_timeout_ms` and heals it with a filler transaction
/// (spec §4.3 "gap handling").
#[instrument(skip_all)]
async fn run_gap_sweep_loop(
    storage: Arc<PostgresStorage>,
    queue: Arc<RedisQueue>,
    ctx: Arc<BroadcastContext>,
    config: Arc<Config>,
    cancellation: tokio_util::sync::CancellationToken,
) {
    let gap_timeout = Duration::from_millis(config.nonce.gap_timeout_ms);
    let tick = Duration::from_secs(1).min(gap_timeout);
    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(tick) => {}
        }

        for (chain_id, from) in ctx.registry.keys() {
            let handle = ctx.registry.handle(chain_id, from);
            let mut state = handle.lock().await;
            if !gap_has_timed_out(&state, gap_timeout) {
                continue;
            }
            let Some(head) = state.head_nonce() else {
                continue;
            };
            if state.pending.contains_key(&head) {
                continue;
            }
            let Some((chain, network)) = state.pending.values().next().map(|e| (e.msg.chain, e.msg.network))
            else {
                continue;
            };

            match issue_gap_filler(ctx.as_ref(), chain, network, from, head).await {
                Ok(filler_msg) => {
                    warn!(chain = %chain, network = %network, nonce = head, "issued nonce gap filler transaction");
                    if let Err(e) = ctx.nonces.resolve_pending(chain_id, from, head).await {
                        warn!(error = %e, nonce = head, "failed to persist lastBroadcastedNonce");
                    }
                    state.last_broadcasted = Some(head);
                    if let Err(e) =
                        Queue::<BroadcastTxMessage>::send(queue.as_ref(), BROADCAST_TX_QUEUE, &filler_msg).await
                    {
                        error!(error = %e, "failed to publish gap filler broadcast-tx");
                    }
                    let outcome = drain_pending(storage.as_ref(), ctx.as_ref(), from, &mut state).await;
                    drop(state);
                    apply_outcome(queue.as_ref(), outcome).await;
                }
                Err(e) => {
                    error!(error = %e, chain = %chain, network = %network, nonce = head, "gap filler transaction failed");
                }
            }
        }
    }
}
