//! Broadcast ordering and submission (spec §4.3): buffers signed
//! transactions per `(chainId, signer)`, drains the contiguous nonce prefix
//! in order, and re-signs with bumped gas when the node rejects a send as
//! underpriced or already known.

use std::time::{Duration, Instant};

use alloy_primitives::Address;
use alloy_signer::Signer;
use wdp_chain::{broadcast, gas, tx_builder, FeeCache, ProviderCache, SignerSet};
use wdp_config::Config;
use wdp_nonce::{NonceCoordinator, NonceStore, RedisStore};
use wdp_storage::{SignedTxRepo, WithdrawalRequestRepo};
use wdp_types::{
    BroadcastTxMessage, ChainNetwork, HasErrorKind, SignedTxMessage, SignedTxStatus, Subject, WithdrawalStatus,
};

use crate::error::{classify_rejection, BroadcastError, BroadcastRejection};
use crate::state::{BroadcastRegistry, BroadcastState, PendingEntry};

/// Maximum re-sign attempts spent bumping gas on one stuck nonce before the
/// head is left in place for the DLQ path to eventually escalate (spec §4.3
/// "bounded by a policy ceiling").
const MAX_RESIGN_ATTEMPTS: u32 = 5;

/// Generic over [`NonceStore`] so scenario tests can run against
/// [`wdp_nonce::fake::FakeStore`] instead of Redis; every real binary uses
/// the default [`RedisStore`].
pub struct BroadcastContext<N: NonceStore = RedisStore> {
    pub providers: ProviderCache,
    pub signers: SignerSet,
    pub fees: FeeCache,
    pub nonces: NonceCoordinator<N>,
    pub config: Config,
    pub registry: BroadcastRegistry,
}

/// Result of one drain pass.
///
/// `broadcasted` pairs each successfully sent message with the `signed-tx`
/// receipt handle that produced it — not necessarily the handle passed into
/// this call, since a drain can clear entries buffered by earlier cycles
/// once their predecessor arrives. `failed` lists handles whose underlying
/// request(s) were already marked FAILED and nonce released (a terminal
/// error found before or at broadcast) — these just need acking, the head
/// having already advanced past them. `stalled` names the head entry's
/// handle and the error that stopped the drain, if any transient failure
/// remains; entries behind it stay buffered untouched. A caller's own
/// envelope absent from all three lists is sitting in a gap and is left for
/// the queue's visibility timeout to redeliver (safe: re-insertion at the
/// same nonce is idempotent).
pub struct DrainOutcome {
    pub broadcasted: Vec<(String, BroadcastTxMessage)>,
    pub failed: Vec<String>,
    pub stalled: Option<(String, BroadcastError)>,
}

/// Buffers one signed transaction under its `(chainId, signer)` key and
/// drains whatever contiguous nonce prefix is now ready (spec §4.3).
pub async fn enqueue_and_drain<S: SignedTxRepo + WithdrawalRequestRepo, N: NonceStore>(
    storage: &S,
    ctx: &BroadcastContext<N>,
    msg: SignedTxMessage,
    receipt_handle: String,
) -> DrainOutcome {
    let chain_net = ChainNetwork::new(msg.chain, msg.network);
    let chain_id = chain_net.evm_chain_id();
    let from = msg.from;
    let handle = ctx.registry.handle(chain_id, from);
    let mut state = handle.lock().await;

    if let Ok(record_json) = serde_json::to_string(&msg) {
        if let Err(e) = ctx.nonces.record_pending(chain_id, from, msg.nonce, &record_json).await {
            tracing::warn!(error = %e, nonce = msg.nonce, "failed to persist pendingList record");
        }
    }

    state.pending.insert(
        msg.nonce,
        PendingEntry {
            msg,
            receipt_handle,
            first_seen: Instant::now(),
            attempts: 0,
        },
    );

    drain_pending(storage, ctx, from, &mut state).await
}

/// Drains whatever contiguous nonce prefix is ready in an already-locked
/// state, e.g. after [`issue_gap_filler`] closes a gap externally.
pub async fn drain_pending<S: SignedTxRepo + WithdrawalRequestRepo, N: NonceStore>(
    storage: &S,
    ctx: &BroadcastContext<N>,
    from: Address,
    state: &mut BroadcastState,
) -> DrainOutcome {
    let mut broadcasted = Vec::new();
    let mut failed = Vec::new();

    loop {
        let Some(next_nonce) = state.head_nonce() else {
            return DrainOutcome {
                broadcasted,
                failed,
                stalled: None,
            };
        };
        if !state.pending.contains_key(&next_nonce) {
            // Head nonce hasn't arrived yet; this is a gap, not an error.
            return DrainOutcome {
                broadcasted,
                failed,
                stalled: None,
            };
        }

        let (chain, network) = {
            let entry = state.pending.get(&next_nonce).expect("checked above");
            (entry.msg.chain, entry.msg.network)
        };
        let chain_id = ChainNetwork::new(chain, network).evm_chain_id();

        let provider = match ctx.providers.by_chain(chain, network) {
            Ok(p) => p,
            Err(e) => {
                match resolve_head_failure(storage, ctx, chain_id, from, next_nonce, state, e.into(), &mut failed)
                    .await
                {
                    HeadOutcome::Advanced => continue,
                    HeadOutcome::Stalled(stalled) => {
                        return DrainOutcome {
                            broadcasted,
                            failed,
                            stalled: Some(stalled),
                        }
                    }
                }
            }
        };

        if let Err(e) = mark_broadcasting(storage, &state.pending.get(&next_nonce).unwrap().msg).await {
            match resolve_head_failure(storage, ctx, chain_id, from, next_nonce, state, e, &mut failed).await {
                HeadOutcome::Advanced => continue,
                HeadOutcome::Stalled(stalled) => {
                    return DrainOutcome {
                        broadcasted,
                        failed,
                        stalled: Some(stalled),
                    }
                }
            }
        }

        let raw = state.pending.get(&next_nonce).unwrap().msg.raw_transaction.clone();
        match broadcast::send_raw(provider, &raw).await {
            Ok(tx_hash) => {
                let entry = state.pending.remove(&next_nonce).expect("checked above");
                state.last_broadcasted = Some(next_nonce);
                if let Err(e) = ctx.nonces.resolve_pending(chain_id, from, next_nonce).await {
                    tracing::warn!(error = %e, nonce = next_nonce, "failed to persist lastBroadcastedNonce");
                }

                if let Err(e) = mark_sent(storage, &entry.msg).await {
                    return DrainOutcome {
                        broadcasted,
                        failed,
                        stalled: Some((entry.receipt_handle, e)),
                    };
                }

                broadcasted.push((
                    entry.receipt_handle,
                    BroadcastTxMessage {
                        subject: entry.msg.subject,
                        chain: entry.msg.chain,
                        network: entry.msg.network,
                        tx_hash,
                        from,
                        nonce: next_nonce,
                    },
                ));
            }
            Err(chain_err) => {
                let message = chain_err.to_string();
                if classify_rejection(&message) == BroadcastRejection::Underpriced {
                    let entry = state.pending.get_mut(&next_nonce).expect("checked above");
                    if entry.attempts < MAX_RESIGN_ATTEMPTS {
                        match resign_with_bumped_gas(ctx, chain, network, from, entry).await {
                            Ok(()) => continue,
                            Err(e) => {
                                let handle = state.pending.get(&next_nonce).unwrap().receipt_handle.clone();
                                return DrainOutcome {
                                    broadcasted,
                                    failed,
                                    stalled: Some((handle, e)),
                                };
                            }
                        }
                    }
                }
                match resolve_head_failure(
                    storage,
                    ctx,
                    chain_id,
                    from,
                    next_nonce,
                    state,
                    chain_err.into(),
                    &mut failed,
                )
                .await
                {
                    HeadOutcome::Advanced => continue,
                    HeadOutcome::Stalled(stalled) => {
                        return DrainOutcome {
                            broadcasted,
                            failed,
                            stalled: Some(stalled),
                        }
                    }
                }
            }
        }
    }
}

enum HeadOutcome {
    /// The head nonce was terminally failed, persisted, nonce released, and
    /// the drain can proceed to the next nonce.
    Advanced,
    /// The failure is transient; the head stays buffered for retry.
    Stalled((String, BroadcastError)),
}

/// Classifies a failure on the current head nonce: terminal errors mark the
/// underlying request(s) FAILED, release the nonce back to the pool, and
/// advance past it so later-buffered nonces remain reachable (spec §4.3/§7
/// "permanent signing failure -> pool absorbs"); transient errors leave the
/// head exactly where it was for the caller to nack and retry.
async fn resolve_head_failure<S: SignedTxRepo + WithdrawalRequestRepo, N: NonceStore>(
    storage: &S,
    ctx: &BroadcastContext<N>,
    chain_id: u64,
    from: Address,
    nonce: u64,
    state: &mut BroadcastState,
    err: BroadcastError,
    failed: &mut Vec<String>,
) -> HeadOutcome {
    if !err.kind().is_terminal_for_message() {
        let handle = state.pending.get(&nonce).unwrap().receipt_handle.clone();
        return HeadOutcome::Stalled((handle, err));
    }

    let entry = state.pending.remove(&nonce).expect("checked by caller");
    if let Err(persist_err) = mark_failed(storage, &entry.msg, &err.to_string()).await {
        // Couldn't even record the failure; put the entry back and treat as
        // transient so the caller retries rather than silently dropping it.
        state.pending.insert(nonce, entry);
        let handle = state.pending.get(&nonce).unwrap().receipt_handle.clone();
        return HeadOutcome::Stalled((handle, persist_err));
    }
    let _ = ctx.nonces.release(chain_id, from, nonce).await;
    if let Err(e) = ctx.nonces.resolve_pending(chain_id, from, nonce).await {
        tracing::warn!(error = %e, nonce, "failed to persist lastBroadcastedNonce");
    }
    state.last_broadcasted = Some(nonce);
    failed.push(entry.receipt_handle);
    HeadOutcome::Advanced
}

async fn resign_with_bumped_gas<N: NonceStore>(
    ctx: &BroadcastContext<N>,
    chain: wdp_types::Chain,
    network: wdp_types::Network,
    from: Address,
    entry: &mut PendingEntry,
) -> Result<(), BroadcastError> {
    let signer = ctx.signers.next_signer(chain, network)?;
    debug_assert_eq!(signer.address(), from, "resign must reuse the original signer");

    let chain_net = ChainNetwork::new(chain, network);
    let bumped_gas = gas::bump_gas_params(entry.msg.gas, &ctx.config.gas);
    let built = tx_builder::build_and_sign(
        signer,
        chain_net,
        from,
        entry.msg.to,
        entry.msg.value,
        entry.msg.data.clone(),
        entry.msg.nonce,
        entry.msg.gas_limit,
        bumped_gas,
    )
    .await?;

    entry.msg.raw_transaction = built.raw_signed;
    entry.msg.tx_hash = built.tx_hash;
    entry.msg.gas = bumped_gas;
    entry.attempts += 1;
    Ok(())
}

async fn mark_broadcasting<S: SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &SignedTxMessage,
) -> Result<(), BroadcastError> {
    match &msg.subject {
        Subject::Single { request_id } => {
            storage
                .update_single_status(*request_id, SignedTxStatus::Broadcasting, None)
                .await?;
            storage
                .update_status(*request_id, WithdrawalStatus::Broadcasting, None)
                .await?;
        }
        Subject::Batch {
            batch_id,
            request_ids,
        } => {
            storage
                .update_batch_status(*batch_id, SignedTxStatus::Broadcasting, None)
                .await?;
            for id in request_ids {
                storage
                    .update_status(*id, WithdrawalStatus::Broadcasting, None)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn mark_sent<S: SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &SignedTxMessage,
) -> Result<(), BroadcastError> {
    match &msg.subject {
        Subject::Single { request_id } => {
            storage
                .update_single_status(*request_id, SignedTxStatus::Sent, None)
                .await?;
            storage
                .update_status(*request_id, WithdrawalStatus::Sent, None)
                .await?;
        }
        Subject::Batch {
            batch_id,
            request_ids,
        } => {
            storage
                .update_batch_status(*batch_id, SignedTxStatus::Sent, None)
                .await?;
            for id in request_ids {
                storage.update_status(*id, WithdrawalStatus::Sent, None).await?;
            }
        }
    }
    Ok(())
}

/// Marks every request underlying `msg` FAILED after a terminal broadcast
/// error (spec §4.3/§7: non-retryable failures stop at FAILED, no DLQ loop).
pub async fn mark_failed<S: SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &SignedTxMessage,
    reason: &str,
) -> Result<(), BroadcastError> {
    match &msg.subject {
        Subject::Single { request_id } => {
            storage
                .update_single_status(*request_id, SignedTxStatus::Failed, Some(reason.to_string()))
                .await?;
            storage
                .update_status(*request_id, WithdrawalStatus::Failed, Some(reason.to_string()))
                .await?;
        }
        Subject::Batch {
            batch_id,
            request_ids,
        } => {
            storage
                .update_batch_status(*batch_id, SignedTxStatus::Failed, Some(reason.to_string()))
                .await?;
            for id in request_ids {
                storage
                    .update_status(*id, WithdrawalStatus::Failed, Some(reason.to_string()))
                    .await?;
            }
        }
    }
    Ok(())
}

/// Issues a 1-wei self-transfer at the stuck nonce to heal a gap that has
/// outlived `NonceConfig::gap_timeout_ms` (spec §4.3 "gap handling"). Only
/// called for a key whose head nonce is absent, never for one whose head is
/// present but merely slow to confirm.
pub async fn issue_gap_filler<N: NonceStore>(
    ctx: &BroadcastContext<N>,
    chain: wdp_types::Chain,
    network: wdp_types::Network,
    from: Address,
    nonce: u64,
) -> Result<BroadcastTxMessage, BroadcastError> {
    let signer = ctx.signers.next_signer(chain, network)?;
    debug_assert_eq!(signer.address(), from);
    let chain_net = ChainNetwork::new(chain, network);
    let provider = ctx.providers.by_chain(chain, network)?;

    let gas_params = ctx
        .fees
        .gas_params(
            provider,
            chain,
            network,
            chain_net.supports_eip1559(),
            &ctx.config.gas,
        )
        .await?;

    let built = tx_builder::build_and_sign(
        signer,
        chain_net,
        from,
        from,
        alloy_primitives::U256::from(1u8),
        alloy_primitives::Bytes::new(),
        nonce,
        21_000,
        gas_params,
    )
    .await?;

    let tx_hash = broadcast::send_raw(provider, &built.raw_signed).await?;

    Ok(BroadcastTxMessage {
        subject: Subject::Single {
            request_id: wdp_types::RequestId::new(),
        },
        chain,
        network,
        tx_hash,
        from,
        nonce,
    })
}

/// Whether a key's current gap has outlived the configured timeout.
pub fn gap_has_timed_out(state: &BroadcastState, gap_timeout: Duration) -> bool {
    state.gap_age().is_some_and(|age| age >= gap_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PendingEntry;
    use alloy_primitives::{Bytes, B256, U256};
    use wdp_types::{Chain, GasParams, Network, RequestId};

    fn msg(nonce: u64) -> SignedTxMessage {
        SignedTxMessage {
            subject: Subject::Single {
                request_id: RequestId::new(),
            },
            chain: Chain::Polygon,
            network: Network::Mainnet,
            from: Address::ZERO,
            nonce,
            raw_transaction: vec![1, 2, 3],
            tx_hash: B256::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            gas: GasParams::Legacy { gas_price: 1 },
            gas_limit: 21_000,
        }
    }

    fn entry(nonce: u64, age: Duration) -> PendingEntry {
        PendingEntry {
            msg: msg(nonce),
            receipt_handle: format!("handle-{nonce}"),
            first_seen: Instant::now() - age,
            attempts: 0,
        }
    }

    #[test]
    fn gap_times_out_once_older_than_configured_timeout() {
        let mut state = BroadcastState::default();
        state.last_broadcasted = Some(4);
        state.pending.insert(6, entry(6, Duration::from_secs(20)));
        assert!(gap_has_timed_out(&state, Duration::from_secs(10)));
        assert!(!gap_has_timed_out(&state, Duration::from_secs(30)));
    }

    #[test]
    fn no_gap_reported_once_head_is_present() {
        let mut state = BroadcastState::default();
        state.last_broadcasted = Some(4);
        state.pending.insert(5, entry(5, Duration::from_secs(50)));
        assert!(!gap_has_timed_out(&state, Duration::from_secs(1)));
    }
}
