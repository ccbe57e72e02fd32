//! Builds and locally signs a transaction from an explicit nonce and gas
//! params, producing the raw bytes stored on `SignedSingleTransaction` /
//! `SignedBatchTransaction` (spec §3). Signing happens here, offline,
//! against the nonce the coordinator already allocated — broadcasting the
//! resulting raw bytes is a separate step (`provider_cache`), unlike the
//! teacher's `Eip155ChainProvider::send_transaction` which signs and
//! broadcasts in the same call via a wallet-filled provider.

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use wdp_types::{ChainNetwork, GasParams};

use crate::error::ChainError;

pub struct BuiltTransaction {
    pub raw_signed: Vec<u8>,
    pub tx_hash: B256,
}

/// Builds `from -> to` carrying `value` and `data` at `nonce`, signs it with
/// `signer`, and returns the RLP-encoded raw transaction plus its hash.
#[allow(clippy::too_many_arguments)]
pub async fn build_and_sign(
    signer: &PrivateKeySigner,
    chain: ChainNetwork,
    from: Address,
    to: Address,
    value: U256,
    data: Bytes,
    nonce: u64,
    gas_limit: u64,
    gas: GasParams,
) -> Result<BuiltTransaction, ChainError> {
    let mut txr = TransactionRequest::default()
        .with_chain_id(chain.evm_chain_id())
        .with_from(from)
        .with_to(to)
        .with_value(value)
        .with_input(data)
        .with_nonce(nonce)
        .with_gas_limit(gas_limit);

    txr = match gas {
        GasParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => txr
            .with_max_fee_per_gas(max_fee_per_gas)
            .with_max_priority_fee_per_gas(max_priority_fee_per_gas),
        GasParams::Legacy { gas_price } => txr.with_gas_price(gas_price),
    };

    let wallet = EthereumWallet::from(signer.clone());
    let envelope = txr
        .build(&wallet)
        .await
        .map_err(|e| ChainError::Signing(e.to_string()))?;

    Ok(BuiltTransaction {
        tx_hash: *envelope.tx_hash(),
        raw_signed: envelope.encoded_2718(),
    })
}
