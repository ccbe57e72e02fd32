//! Pure validation functions for an intake request (spec §4.1), grounded on
//! the teacher's `assert_*` helpers in `facilitator_local.rs`: each rule is
//! its own function, fails fast, and returns a typed error instead of a
//! generic string.

use crate::error::IngressError;
use crate::intake::IntakeRequest;
use alloy_primitives::Address;
use std::str::FromStr;
use wdp_config::ChainConfig;
use wdp_types::{parse_units, BaseUnits};

/// Validates `amount` against the token's decimals, returning the amount in
/// base units (spec §4.1: "convert to base units using `parseUnits`").
pub fn assert_amount(amount: &str, decimals: u8) -> Result<BaseUnits, IngressError> {
    Ok(parse_units(amount, decimals)?)
}

/// Validates `toAddress` against the EVM hex-40 grammar, case-insensitive
/// (spec §4.1).
pub fn assert_to_address(to_address: &str) -> Result<Address, IngressError> {
    Address::from_str(to_address)
        .map_err(|_| IngressError::InvalidAddress(to_address.to_string()))
}

/// Validates that `tokenAddress` is either the native sentinel or a known
/// ERC-20 on this chain's configuration, returning its decimals.
pub fn assert_token(
    token_address: Address,
    chain_config: &ChainConfig,
) -> Result<u8, IngressError> {
    if token_address == wdp_types::NATIVE_TOKEN_SENTINEL {
        return Ok(18);
    }
    chain_config
        .supported_tokens
        .iter()
        .find(|t| t.address == token_address)
        .map(|t| t.decimals)
        .ok_or_else(|| IngressError::UnknownToken {
            token: token_address.to_string(),
            chain: chain_config.chain,
            network: chain_config.network,
        })
}

/// Looks up the chain configuration for `(chain, network)`, the "is in the
/// supported set" check (spec §4.1).
pub fn assert_chain_network<'a>(
    request: &IntakeRequest,
    config: &'a wdp_config::Config,
) -> Result<&'a ChainConfig, IngressError> {
    config
        .chain(request.chain, request.network)
        .map_err(|_| IngressError::UnsupportedChainNetwork(request.chain, request.network))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_native_sentinel_without_lookup() {
        let decimals = assert_amount("1.5", 18).unwrap();
        assert!(decimals.0 > alloy_primitives::U256::ZERO);
    }

    #[test]
    fn rejects_malformed_address() {
        assert!(assert_to_address("not-an-address").is_err());
    }

    #[test]
    fn accepts_checksum_insensitive_address() {
        let lower = assert_to_address("0x00000000000000000000000000000000000aaa").unwrap();
        let upper = assert_to_address("0x00000000000000000000000000000000000AAA").unwrap();
        assert_eq!(lower, upper);
    }
}
