//! EVM signer credentials and per-chain RPC configuration.

use crate::literal_or_env::LiteralOrEnv;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;
use wdp_types::{Chain, Network};

/// A validated 32-byte EVM private key.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct EvmPrivateKey(B256);

impl EvmPrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for EvmPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EvmPrivateKey(redacted)")
    }
}

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| format!("invalid EVM private key: {e}"))
    }
}

/// The custodial signer key for a chain. Supports multiple signers for
/// round-robin load distribution; secrets resolved literally or via
/// `$ENV_VAR` indirection.
pub type SignerConfig = Vec<LiteralOrEnv<EvmPrivateKey>>;

/// RPC endpoint configuration for a single provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcEndpoint {
    pub http: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// Configuration for one `(chain, network)` pair (spec §4.1 supported set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain: Chain,
    pub network: Network,
    pub signers: SignerConfig,
    pub rpc: Vec<RpcEndpoint>,
    /// Overrides [`wdp_types::ChainNetwork::default_confirmations`] when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    /// Overrides [`wdp_types::ChainNetwork::default_reorg_window`] when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorg_window: Option<u64>,
    /// Known ERC-20 token addresses supported for withdrawal on this chain,
    /// keyed by symbol (spec §4.1: "known supported ERC-20").
    #[serde(default)]
    pub supported_tokens: Vec<SupportedToken>,
    /// The Multicall3-style aggregator contract used for batched transfers
    /// (spec §4.2).
    pub multicall_address: alloy_primitives::Address,
    /// Maximum gas a single batch transaction may request, a safety margin
    /// against the chain's block gas limit (spec §4.2).
    #[serde(default = "crate::tunables::defaults::batch_gas_limit_cap")]
    pub batch_gas_limit_cap: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedToken {
    pub symbol: String,
    pub address: alloy_primitives::Address,
    pub decimals: u8,
}

