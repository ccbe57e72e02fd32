//! Raw-transaction broadcast and receipt polling (spec §4.3, §4.4).

use alloy_primitives::B256;
use alloy_provider::{PendingTransactionConfig, Provider, RootProvider};
use alloy_rpc_types_eth::TransactionReceipt;
use std::time::Duration;

use crate::error::ChainError;

/// Submits an already-signed raw transaction, returning the hash the node
/// accepted it under (normally identical to the locally computed hash; they
/// can differ only if the node rewrites the transaction, which does not
/// happen for standard EIP-1559/legacy sends).
pub async fn send_raw(provider: &RootProvider, raw_signed: &[u8]) -> Result<B256, ChainError> {
    provider
        .send_raw_transaction(raw_signed)
        .await
        .map(|pending| *pending.tx_hash())
        .map_err(|e| ChainError::Transport(e.to_string()))
}

/// Polls for a transaction's receipt without blocking on confirmations,
/// returning `None` while the transaction is still pending (spec §4.4: the
/// Monitor polls `eth_getTransactionReceipt` on its own backoff schedule
/// rather than subscribing).
pub async fn try_get_receipt(
    provider: &RootProvider,
    tx_hash: B256,
) -> Result<Option<TransactionReceipt>, ChainError> {
    provider
        .get_transaction_receipt(tx_hash)
        .await
        .map_err(|e| ChainError::Transport(e.to_string()))
}

/// Current chain tip, used to compute confirmations and detect reorgs
/// (spec §4.4).
pub async fn block_number(provider: &RootProvider) -> Result<u64, ChainError> {
    provider
        .get_block_number()
        .await
        .map_err(|e| ChainError::Transport(e.to_string()))
}

/// Waits up to `timeout` for a receipt to appear, polling every 500ms. Used
/// sparingly (SPEC_FULL.md §4.4 prefers the Monitor's own adaptive backoff
/// for most polling); this is for callers that need a bounded, synchronous
/// wait.
pub async fn wait_for_receipt(
    provider: &RootProvider,
    tx_hash: B256,
    timeout: Duration,
) -> Result<Option<TransactionReceipt>, ChainError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(receipt) = try_get_receipt(provider, tx_hash).await? {
            return Ok(Some(receipt));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Reconstructs a [`PendingTransactionConfig`] for a transaction already
/// broadcast, allowing `with_required_confirmations`-style waiting when a
/// caller wants the provider's own watcher instead of manual polling.
pub fn pending_config(tx_hash: B256) -> PendingTransactionConfig {
    PendingTransactionConfig::new(tx_hash)
}
