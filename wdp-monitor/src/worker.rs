//! Per-transaction receipt polling (spec §4.4): each `broadcast-tx` message
//! spawns one independent monitoring loop that polls with adaptive backoff
//! until it reaches a terminal outcome, tolerating reorgs up to a bounded
//! window and surfacing a (log-only) alert hook past the pending-duration
//! threshold.

use std::time::{Duration, Instant};

use alloy_primitives::B256;
use tracing::{info, instrument, warn};
use wdp_chain::broadcast::{block_number, try_get_receipt};
use wdp_chain::ProviderCache;
use wdp_config::Config;
use wdp_storage::{SentTxRepo, SignedTxRepo, WithdrawalRequestRepo};
use wdp_types::{
    BroadcastTxMessage, ChainNetwork, SentTransaction, SignedTxStatus, Subject, WithdrawalStatus,
};

use crate::error::MonitorError;
use crate::receipt::{evaluate_receipt, is_reorg, reorg_window_exhausted, ReceiptFields, ReceiptOutcome};

pub struct MonitorContext {
    pub providers: ProviderCache,
    pub config: Config,
}

/// Terminal result of monitoring one broadcast transaction.
#[derive(Debug)]
pub enum MonitorOutcome {
    Confirmed,
    Failed(String),
}

/// Polls `tx_hash` until it reaches a terminal state, persisting the result
/// and returning it so the caller can ack the originating `broadcast-tx`
/// delivery. Never returns early on a transient RPC error: those are logged
/// and the backoff schedule simply repeats its slowest stage.
#[instrument(skip(storage, ctx), fields(chain = %msg.chain, network = %msg.network, nonce = msg.nonce))]
pub async fn monitor_transaction<S: SentTxRepo + SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    ctx: &MonitorContext,
    msg: &BroadcastTxMessage,
) -> Result<MonitorOutcome, MonitorError> {
    let chain_net = ChainNetwork::new(msg.chain, msg.network);
    let chain_id = chain_net.evm_chain_id();
    let confirmations_required = ctx
        .config
        .chain(msg.chain, msg.network)
        .ok()
        .and_then(|c| c.confirmations)
        .unwrap_or_else(|| chain_net.default_confirmations());
    let reorg_window = ctx
        .config
        .chain(msg.chain, msg.network)
        .ok()
        .and_then(|c| c.reorg_window)
        .unwrap_or_else(|| chain_net.default_reorg_window());
    let provider = ctx.providers.by_chain(msg.chain, msg.network)?;

    let backoff_stages = ctx.config.monitor.backoff_stages_ms;
    let pending_alert_after = Duration::from_secs(ctx.config.monitor.pending_alert_after_secs);

    let tx_hash = msg.tx_hash;
    let mut stage = 0usize;
    let mut last_seen_block: Option<u64> = None;
    let mut reorg_started_block: Option<u64> = None;
    let first_seen = Instant::now();
    let mut alerted = false;

    loop {
        let receipt = try_get_receipt(provider, tx_hash).await.ok().flatten();
        let fields = receipt.as_ref().map(|r| ReceiptFields {
            status_success: r.status(),
            block_number: r.block_number.unwrap_or_default(),
            gas_used: r.gas_used,
        });

        if is_reorg(last_seen_block, fields) {
            let started = reorg_started_block.get_or_insert(last_seen_block.expect("checked by is_reorg"));
            let current = block_number(provider).await.unwrap_or(*started);
            warn!(block = current, "receipt disappeared, possible reorg");
            if reorg_window_exhausted(*started, current, reorg_window) {
                let reason = "reorg window exhausted without transaction reappearing".to_string();
                mark_terminal(storage, msg, &reason).await?;
                return Ok(MonitorOutcome::Failed(reason));
            }
            last_seen_block = None;
            tokio::time::sleep(Duration::from_millis(backoff_stages[0])).await;
            continue;
        }

        let current_block = block_number(provider).await.unwrap_or(0);
        match evaluate_receipt(fields, current_block, confirmations_required) {
            ReceiptOutcome::Pending => {
                if !alerted && first_seen.elapsed() >= pending_alert_after {
                    alerted = true;
                    warn!(
                        elapsed_secs = first_seen.elapsed().as_secs(),
                        "transaction pending past alert threshold"
                    );
                }
            }
            ReceiptOutcome::AwaitingConfirmations { block_number, .. } => {
                last_seen_block = Some(block_number);
                reorg_started_block = None;
            }
            ReceiptOutcome::Reverted { block_number } => {
                last_seen_block = Some(block_number);
                let reason = "reverted".to_string();
                mark_terminal(storage, msg, &reason).await?;
                return Ok(MonitorOutcome::Failed(reason));
            }
            ReceiptOutcome::Confirmed {
                block_number,
                gas_used,
            } => {
                info!(block_number, gas_used, "transaction confirmed");
                record_confirmation(storage, msg, chain_id, tx_hash, block_number, gas_used).await?;
                return Ok(MonitorOutcome::Confirmed);
            }
        }

        stage = (stage + 1).min(backoff_stages.len() - 1);
        tokio::time::sleep(Duration::from_millis(backoff_stages[stage])).await;
    }
}

async fn record_confirmation<S: SentTxRepo + SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &BroadcastTxMessage,
    chain_id: u64,
    tx_hash: B256,
    block_number: u64,
    gas_used: u64,
) -> Result<(), MonitorError> {
    storage
        .insert(&SentTransaction {
            original_tx_hash: msg.tx_hash,
            accepted_tx_hash: tx_hash,
            chain_id,
            from: msg.from,
            nonce: msg.nonce,
            block_number,
            gas_used,
            confirmed_at: chrono::Utc::now(),
        })
        .await?;
    apply_status(storage, msg, SignedTxStatus::Confirmed, WithdrawalStatus::Confirmed, None).await
}

async fn mark_terminal<S: SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &BroadcastTxMessage,
    reason: &str,
) -> Result<(), MonitorError> {
    apply_status(
        storage,
        msg,
        SignedTxStatus::Failed,
        WithdrawalStatus::Failed,
        Some(reason.to_string()),
    )
    .await
}

async fn apply_status<S: SignedTxRepo + WithdrawalRequestRepo>(
    storage: &S,
    msg: &BroadcastTxMessage,
    signed_status: SignedTxStatus,
    request_status: WithdrawalStatus,
    error_message: Option<String>,
) -> Result<(), MonitorError> {
    match &msg.subject {
        Subject::Single { request_id } => {
            storage
                .update_single_status(*request_id, signed_status, error_message.clone())
                .await?;
            storage
                .update_status(*request_id, request_status, error_message)
                .await?;
        }
        Subject::Batch {
            batch_id,
            request_ids,
        } => {
            storage
                .update_batch_status(*batch_id, signed_status, error_message.clone())
                .await?;
            for id in request_ids {
                storage
                    .update_status(*id, request_status, error_message.clone())
                    .await?;
            }
        }
    }
    Ok(())
}
