//! Per-receive-cycle signing logic (spec §4.2): ingress-filter, batching
//! decision, gas/nonce acquisition, signing, persistence, and emission.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, U256};
use alloy_signer::Signer;
use tracing::instrument;
use wdp_chain::{erc20, multicall, tx_builder, FeeCache, ProviderCache, SignerSet};
use wdp_config::Config;
use wdp_nonce::{NonceCoordinator, NonceStore, RedisStore};
use wdp_storage::{SignedTxRepo, WithdrawalRequestRepo};
use wdp_types::{
    BatchId, Chain, Network, RequestId, SignedBatchTransaction, SignedSingleTransaction,
    SignedTxMessage, SignedTxStatus, Subject, TxRequestMessage, WithdrawalStatus,
    NATIVE_TOKEN_SENTINEL,
};

use crate::batching::{decide, BatchDecision};
use crate::error::SigningError;

/// Everything the signing cycle needs to reach the chain, held for the
/// worker process's lifetime. Generic over [`NonceStore`] so scenario tests
/// can run against [`wdp_nonce::fake::FakeStore`] instead of Redis; every
/// real binary uses the default [`RedisStore`].
pub struct SigningContext<N: NonceStore = RedisStore> {
    pub providers: ProviderCache,
    pub signers: SignerSet,
    pub fees: FeeCache,
    pub nonces: NonceCoordinator<N>,
    pub config: Config,
}

/// Groups batch-eligible messages by `(chain, network, tokenAddress)` (spec
/// §4.2). Native-token transfers are split into their own singleton groups
/// since [`decide`] always returns SINGLE for them.
pub fn group_by_token(
    messages: Vec<TxRequestMessage>,
) -> HashMap<(Chain, Network, Address), Vec<TxRequestMessage>> {
    let mut groups: HashMap<(Chain, Network, Address), Vec<TxRequestMessage>> = HashMap::new();
    for msg in messages {
        let key = (msg.chain, msg.network, msg.token_address);
        groups.entry(key).or_default().push(msg);
    }
    groups
}

/// Re-reads the persisted request and refuses if it is not PENDING (spec
/// §4.2 "Ingress filter"), flipping it to VALIDATING on success.
async fn enter_validating<S: WithdrawalRequestRepo>(
    storage: &S,
    request_id: RequestId,
) -> Result<(), SigningError> {
    let current = storage.get(request_id).await?;
    if current.status != WithdrawalStatus::Pending {
        return Err(SigningError::NotPending(request_id));
    }
    storage
        .update_status(request_id, WithdrawalStatus::Validating, None)
        .await?;
    Ok(())
}

/// Signs and persists one non-batched withdrawal (spec §4.2).
#[instrument(skip_all, fields(request_id = %msg.request_id))]
pub async fn sign_single<S: WithdrawalRequestRepo + SignedTxRepo, N: NonceStore>(
    storage: &S,
    ctx: &SigningContext<N>,
    msg: &TxRequestMessage,
) -> Result<SignedTxMessage, SigningError> {
    enter_validating(storage, msg.request_id).await?;

    let chain_config = ctx
        .config
        .chain(msg.chain, msg.network)
        .map_err(|_| wdp_chain::ChainError::UnknownChain(msg.chain, msg.network))?;
    let chain_net = wdp_types::ChainNetwork::new(msg.chain, msg.network);
    let provider = ctx.providers.by_chain(msg.chain, msg.network)?;
    let signer = ctx.signers.next_signer(msg.chain, msg.network)?;
    let from = signer.address();

    let amount = wdp_types::parse_units(
        &msg.amount,
        token_decimals(msg.token_address, chain_config),
    )
    .map_err(|e| SigningError::InvalidAmount(msg.request_id, e))?;

    let (to, value, data) = if msg.token_address == NATIVE_TOKEN_SENTINEL {
        (msg.to_address, amount.0, Bytes::new())
    } else {
        (
            msg.token_address,
            U256::ZERO,
            erc20::encode_transfer(msg.to_address, amount.0),
        )
    };

    let gas = ctx
        .fees
        .gas_params(
            provider,
            msg.chain,
            msg.network,
            chain_net.supports_eip1559(),
            &ctx.config.gas,
        )
        .await?;

    let gas_limit = ctx.config.batching.single_tx_gas_estimate
        + ctx.config.batching.single_tx_gas_estimate * ctx.config.gas.buffer_percent as u64 / 100;

    let nonce = ctx
        .nonces
        .allocate(chain_net.evm_chain_id(), from, || async {
            wdp_chain::provider_cache::pending_transaction_count(provider, from)
                .await
                .map_err(|e| wdp_nonce::NonceError::Bootstrap(e.to_string()))
        })
        .await?;

    let result = sign_and_persist_single(storage, msg, chain_net, signer, from, to, value, data, nonce, gas, gas_limit)
        .await;
    if result.is_err() {
        // Nothing broadcast yet; the allocated nonce is unused and goes back
        // to the pool (spec §4.2 "transient -> release nonce + nack").
        let _ = ctx.nonces.release(chain_net.evm_chain_id(), from, nonce).await;
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn sign_and_persist_single<S: WithdrawalRequestRepo + SignedTxRepo>(
    storage: &S,
    msg: &TxRequestMessage,
    chain_net: wdp_types::ChainNetwork,
    signer: &alloy_signer_local::PrivateKeySigner,
    from: Address,
    to: Address,
    value: U256,
    data: Bytes,
    nonce: u64,
    gas: wdp_types::GasParams,
    gas_limit: u64,
) -> Result<SignedTxMessage, SigningError> {
    let built = tx_builder::build_and_sign(
        signer, chain_net, from, to, value, data.clone(), nonce, gas_limit, gas,
    )
    .await?;

    let signed = SignedSingleTransaction {
        request_id: msg.request_id,
        raw_signed: built.raw_signed.clone(),
        from,
        to,
        value,
        nonce,
        gas,
        gas_limit,
        chain_id: chain_net.evm_chain_id(),
        tx_hash: built.tx_hash,
        try_count: 0,
        status: SignedTxStatus::Signed,
        error_message: None,
        created_at: chrono::Utc::now(),
    };
    storage.insert_single(&signed).await?;
    storage
        .update_status(msg.request_id, WithdrawalStatus::Signed, None)
        .await?;

    Ok(SignedTxMessage {
        subject: Subject::Single {
            request_id: msg.request_id,
        },
        chain: msg.chain,
        network: msg.network,
        from,
        nonce,
        raw_transaction: built.raw_signed,
        tx_hash: built.tx_hash,
        to,
        value,
        data,
        gas,
        gas_limit,
    })
}

/// Signs and persists one batch of withdrawals folded into a single
/// Multicall3-style transaction (spec §4.2).
#[instrument(skip_all, fields(group_size = group.len()))]
pub async fn sign_batch<S: WithdrawalRequestRepo + SignedTxRepo, N: NonceStore>(
    storage: &S,
    ctx: &SigningContext<N>,
    group: &[TxRequestMessage],
) -> Result<SignedTxMessage, SigningError> {
    for msg in group {
        enter_validating(storage, msg.request_id).await?;
    }

    let first = &group[0];
    let chain_config = ctx
        .config
        .chain(first.chain, first.network)
        .map_err(|_| wdp_chain::ChainError::UnknownChain(first.chain, first.network))?;
    let chain_net = wdp_types::ChainNetwork::new(first.chain, first.network);
    let provider = ctx.providers.by_chain(first.chain, first.network)?;
    let signer = ctx.signers.next_signer(first.chain, first.network)?;
    let from = signer.address();
    let decimals = token_decimals(first.token_address, chain_config);

    let calls = group
        .iter()
        .map(|msg| {
            let amount = wdp_types::parse_units(&msg.amount, decimals)
                .map_err(|e| SigningError::InvalidAmount(msg.request_id, e))?;
            Ok(multicall::BatchCall {
                target: msg.token_address,
                call_data: erc20::encode_transfer(msg.to_address, amount.0),
                value: U256::ZERO,
                allow_failure: false,
            })
        })
        .collect::<Result<Vec<_>, SigningError>>()?;
    let data = multicall::encode_batch(calls);

    let gas = ctx
        .fees
        .gas_params(
            provider,
            first.chain,
            first.network,
            chain_net.supports_eip1559(),
            &ctx.config.gas,
        )
        .await?;

    let gas_limit = (ctx.config.batching.batch_base_gas
        + ctx.config.batching.batch_per_tx_gas * group.len() as u64)
        .min(chain_config.batch_gas_limit_cap);

    let nonce = ctx
        .nonces
        .allocate(chain_net.evm_chain_id(), from, || async {
            wdp_chain::provider_cache::pending_transaction_count(provider, from)
                .await
                .map_err(|e| wdp_nonce::NonceError::Bootstrap(e.to_string()))
        })
        .await?;

    let result = sign_and_persist_batch(
        storage,
        group,
        chain_net,
        signer,
        from,
        chain_config.multicall_address,
        data,
        nonce,
        gas,
        gas_limit,
    )
    .await;
    if result.is_err() {
        let _ = ctx.nonces.release(chain_net.evm_chain_id(), from, nonce).await;
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn sign_and_persist_batch<S: WithdrawalRequestRepo + SignedTxRepo>(
    storage: &S,
    group: &[TxRequestMessage],
    chain_net: wdp_types::ChainNetwork,
    signer: &alloy_signer_local::PrivateKeySigner,
    from: Address,
    multicall_address: Address,
    data: Bytes,
    nonce: u64,
    gas: wdp_types::GasParams,
    gas_limit: u64,
) -> Result<SignedTxMessage, SigningError> {
    let first = &group[0];
    let built = tx_builder::build_and_sign(
        signer,
        chain_net,
        from,
        multicall_address,
        U256::ZERO,
        data.clone(),
        nonce,
        gas_limit,
        gas,
    )
    .await?;

    let batch_id = BatchId::new();
    let request_ids: Vec<RequestId> = group.iter().map(|m| m.request_id).collect();

    let signed = SignedBatchTransaction {
        batch_id,
        request_ids: request_ids.clone(),
        raw_signed: built.raw_signed.clone(),
        from,
        to: multicall_address,
        value: U256::ZERO,
        nonce,
        gas,
        gas_limit,
        chain_id: chain_net.evm_chain_id(),
        tx_hash: built.tx_hash,
        try_count: 0,
        status: SignedTxStatus::Signed,
        error_message: None,
        created_at: chrono::Utc::now(),
    };
    storage.insert_batch(&signed).await?;
    for msg in group {
        storage.assign_batch(msg.request_id, batch_id).await?;
        storage
            .update_status(msg.request_id, WithdrawalStatus::Signed, None)
            .await?;
    }

    Ok(SignedTxMessage {
        subject: Subject::Batch {
            batch_id,
            request_ids,
        },
        chain: first.chain,
        network: first.network,
        from,
        nonce,
        raw_transaction: built.raw_signed,
        tx_hash: built.tx_hash,
        to: multicall_address,
        value: U256::ZERO,
        data,
        gas,
        gas_limit,
    })
}

fn token_decimals(token_address: Address, chain_config: &wdp_config::ChainConfig) -> u8 {
    if token_address == NATIVE_TOKEN_SENTINEL {
        return 18;
    }
    chain_config
        .supported_tokens
        .iter()
        .find(|t| t.address == token_address)
        .map(|t| t.decimals)
        .unwrap_or(18)
}

/// Applies the BATCH/SINGLE decision to one `(chain, network, tokenAddress)`
/// group, returning the sub-groups that should each become one multicall
/// (possibly a single group containing everything) versus the messages that
/// stay SINGLE.
pub fn partition_group(
    messages: Vec<TxRequestMessage>,
    is_native: bool,
    gas_limit_cap: u64,
    config: &wdp_config::BatchingConfig,
) -> (Vec<TxRequestMessage>, Option<Vec<TxRequestMessage>>) {
    match decide(is_native, messages.len(), gas_limit_cap, config) {
        BatchDecision::Single => (messages, None),
        BatchDecision::Batch => (Vec::new(), Some(messages)),
    }
}
