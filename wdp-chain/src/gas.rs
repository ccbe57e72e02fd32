//! Gas estimation with a safety buffer, and the bump-and-resign arithmetic
//! used when a broadcast transaction comes back underpriced or stuck
//! (spec §4.3: "x1.1 per attempt... bounded by a policy ceiling").

use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use wdp_config::GasConfig;
use wdp_types::GasParams;

use crate::error::ChainError;

/// Estimates gas for `txr` and applies `buffer_percent` margin, mirroring the
/// teacher's `estimate_gas(...).block(block_id)` call in
/// `Eip155ChainProvider::send_transaction`.
pub async fn estimate_with_buffer(
    provider: &RootProvider,
    txr: TransactionRequest,
    buffer_percent: u32,
) -> Result<u64, ChainError> {
    let estimated = provider
        .estimate_gas(txr)
        .block(BlockId::pending())
        .await
        .map_err(|e| ChainError::GasEstimation(e.to_string()))?;
    Ok(estimated + estimated * buffer_percent as u64 / 100)
}

/// Multiplies `original`'s fee fields by `gas_bump_multiplier_permille`,
/// capped so no single field ever exceeds
/// `original * gas_bump_ceiling_permille / 1000`.
pub fn bump_gas_params(original: GasParams, config: &GasConfig) -> GasParams {
    let bump = |value: u128| -> u128 {
        let bumped = value * config.gas_bump_multiplier_permille as u128 / 1_000;
        let ceiling = value * config.gas_bump_ceiling_permille as u128 / 1_000;
        bumped.min(ceiling.max(value))
    };
    match original {
        GasParams::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => GasParams::Eip1559 {
            max_fee_per_gas: bump(max_fee_per_gas),
            max_priority_fee_per_gas: bump(max_priority_fee_per_gas),
        },
        GasParams::Legacy { gas_price } => GasParams::Legacy {
            gas_price: bump(gas_price),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GasConfig {
        GasConfig {
            tip_percent: 10,
            buffer_percent: 20,
            fee_cache_ttl_ms: 1_000,
            gas_bump_multiplier_permille: 1_100,
            gas_bump_ceiling_permille: 3_000,
        }
    }

    #[test]
    fn bump_increases_legacy_gas_price_by_ten_percent() {
        let bumped = bump_gas_params(GasParams::Legacy { gas_price: 100 }, &config());
        match bumped {
            GasParams::Legacy { gas_price } => assert_eq!(gas_price, 110),
            _ => panic!("expected legacy"),
        }
    }

    #[test]
    fn bump_never_exceeds_the_ceiling() {
        let mut params = GasParams::Legacy { gas_price: 100 };
        for _ in 0..50 {
            params = bump_gas_params(params, &config());
        }
        match params {
            GasParams::Legacy { gas_price } => assert!(gas_price <= 300),
            _ => panic!("expected legacy"),
        }
    }
}
