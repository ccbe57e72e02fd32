//! `submit`: the one entry point Ingress exposes, wiring validation to
//! transactional persist-then-publish (spec §4.1).

use crate::error::IngressError;
use crate::intake::IntakeRequest;
use crate::validation::{assert_amount, assert_chain_network, assert_to_address, assert_token};
use alloy_primitives::Address;
use chrono::Utc;
use tracing::instrument;
use wdp_storage::{StorageError, TransactionalInsert, WithdrawalRequestRepo};
use wdp_types::{
    ProcessingMode, RequestId, TxRequestMessage, WithdrawalRequest, WithdrawalStatus,
};

pub const TX_REQUEST_QUEUE: &str = "tx-request";

/// Validates and persists an intake request, transactionally enqueuing the
/// `tx-request` outbox row in the same write (spec §4.1). Returns the
/// request's `requestId`, generating one if the caller did not supply one.
#[instrument(skip_all, err, fields(chain = %request.chain, network = %request.network))]
pub async fn submit<S>(
    storage: &S,
    config: &wdp_config::Config,
    request: IntakeRequest,
) -> Result<RequestId, IngressError>
where
    S: WithdrawalRequestRepo + TransactionalInsert,
{
    let request_id = request.request_id.unwrap_or_default();

    // Idempotent no-op for a previously-accepted requestId (spec §4.1).
    match storage.get(request_id).await {
        Ok(existing) => return Ok(existing.request_id),
        Err(StorageError::RequestNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let (to_address, token_address) = match validate(&request, config) {
        Ok(fields) => fields,
        Err(e) => {
            persist_failed(storage, request_id, &request, &e).await;
            return Err(e);
        }
    };

    let now = Utc::now();
    let withdrawal = WithdrawalRequest {
        request_id,
        amount: request.amount.clone(),
        symbol: request.symbol.clone(),
        token_address,
        to_address,
        chain: request.chain,
        network: request.network,
        status: WithdrawalStatus::Pending,
        processing_mode: ProcessingMode::Single,
        batch_id: None,
        try_count: 0,
        error_message: None,
        created_at: now,
        updated_at: now,
    };

    let message = TxRequestMessage {
        request_id,
        amount: request.amount,
        symbol: request.symbol,
        to_address,
        token_address,
        chain: request.chain,
        network: request.network,
        created_at: now,
    };
    let payload = serde_json::to_value(&message).map_err(wdp_queue::QueueError::from)?;

    storage
        .insert_request_with_outbox(&withdrawal, TX_REQUEST_QUEUE, payload)
        .await?;

    Ok(request_id)
}

/// Runs the full validation chain, returning the resolved `(to_address,
/// token_address)` on success. Order matters: each `assert_*` can only run
/// once its inputs are known, so a chain/network rejection short-circuits
/// before an unsupported token is even looked up.
fn validate(
    request: &IntakeRequest,
    config: &wdp_config::Config,
) -> Result<(Address, Address), IngressError> {
    let chain_config = assert_chain_network(request, config)?;
    let to_address = assert_to_address(&request.to_address)?;
    let token_address = assert_to_address(&request.token_address)?;
    let decimals = assert_token(token_address, chain_config)?;
    assert_amount(&request.amount, decimals)?;
    Ok((to_address, token_address))
}

/// Persists the queryable FAILED row a validation rejection still owes the
/// caller (spec §4.1 S2: "status immediately FAILED"), with no outbox
/// publication. Fields `validate` never got far enough to resolve fall back
/// to `Address::ZERO` — the error message, not the address, is what a caller
/// queries this row for.
async fn persist_failed<S: WithdrawalRequestRepo>(
    storage: &S,
    request_id: RequestId,
    request: &IntakeRequest,
    error: &IngressError,
) {
    let now = Utc::now();
    let withdrawal = WithdrawalRequest {
        request_id,
        amount: request.amount.clone(),
        symbol: request.symbol.clone(),
        token_address: Address::ZERO,
        to_address: Address::ZERO,
        chain: request.chain,
        network: request.network,
        status: WithdrawalStatus::Failed,
        processing_mode: ProcessingMode::Single,
        batch_id: None,
        try_count: 0,
        error_message: Some(error.to_string()),
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = storage.insert(&withdrawal).await {
        tracing::warn!(error = %e, %request_id, "failed to persist FAILED row for rejected request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdp_config::{ChainConfig, Config, RpcEndpoint, StoreConfig, SupportedToken};
    use wdp_storage::memory::InMemoryStorage;
    use wdp_types::{Chain, Network};

    fn test_config() -> Config {
        Config {
            chains: vec![ChainConfig {
                chain: Chain::Polygon,
                network: Network::Mainnet,
                signers: vec![],
                rpc: vec![RpcEndpoint {
                    http: "http://localhost:8545".parse().unwrap(),
                    rate_limit: None,
                }],
                confirmations: None,
                reorg_window: None,
                supported_tokens: vec![SupportedToken {
                    symbol: "USDC".to_string(),
                    address: "0x0000000000000000000000000000000000d00d"
                        .parse()
                        .unwrap(),
                    decimals: 6,
                }],
                multicall_address: "0x000000000000000000000000000000000ca11c"
                    .parse()
                    .unwrap(),
                batch_gas_limit_cap: 5_000_000,
            }],
            store: StoreConfig {
                redis_url: "redis://localhost".parse().unwrap(),
                database_url: "postgres://localhost/wdp".to_string(),
            },
            batching: Default::default(),
            gas: Default::default(),
            retry: Default::default(),
            nonce: Default::default(),
            monitor: Default::default(),
            receive_batch_size: 10,
            long_poll_secs: 20,
            shutdown_grace_secs: 30,
        }
    }

    fn sample_intake() -> IntakeRequest {
        IntakeRequest {
            request_id: None,
            amount: "1.5".to_string(),
            to_address: "0x000000000000000000000000000000000000aa".to_string(),
            token_address: "0x0000000000000000000000000000000000d00d".to_string(),
            chain: Chain::Polygon,
            network: Network::Mainnet,
            symbol: Some("USDC".to_string()),
        }
    }

    #[tokio::test]
    async fn accepts_a_valid_request_and_persists_pending() {
        let storage = InMemoryStorage::new();
        let config = test_config();
        let request_id = submit(&storage, &config, sample_intake()).await.unwrap();
        let persisted = storage.get(request_id).await.unwrap();
        assert_eq!(persisted.status, WithdrawalStatus::Pending);
    }

    #[tokio::test]
    async fn rejects_unknown_token() {
        let storage = InMemoryStorage::new();
        let config = test_config();
        let mut intake = sample_intake();
        intake.token_address = "0x00000000000000000000000000000000000bad".to_string();
        let request_id = intake.request_id.get_or_insert_with(RequestId::new).to_owned();
        let result = submit(&storage, &config, intake).await;
        assert!(matches!(result, Err(IngressError::UnknownToken { .. })));

        let persisted = storage.get(request_id).await.unwrap();
        assert_eq!(persisted.status, WithdrawalStatus::Failed);
        assert!(persisted.error_message.is_some());
    }

    #[tokio::test]
    async fn rejects_excess_precision_amount() {
        let storage = InMemoryStorage::new();
        let config = test_config();
        let mut intake = sample_intake();
        intake.amount = "1.1234567".to_string();
        let request_id = intake.request_id.get_or_insert_with(RequestId::new).to_owned();
        let result = submit(&storage, &config, intake).await;
        assert!(matches!(result, Err(IngressError::InvalidAmount(_))));

        let persisted = storage.get(request_id).await.unwrap();
        assert_eq!(persisted.status, WithdrawalStatus::Failed);
        assert!(persisted.error_message.is_some());
    }

    #[tokio::test]
    async fn duplicate_request_id_is_a_no_op() {
        let storage = InMemoryStorage::new();
        let config = test_config();
        let mut intake = sample_intake();
        let id = RequestId::new();
        intake.request_id = Some(id);
        let first = submit(&storage, &config, intake.clone()).await.unwrap();
        let second = submit(&storage, &config, intake).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, id);
    }
}
