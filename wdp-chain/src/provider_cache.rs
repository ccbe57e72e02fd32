//! A cache of pre-connected read/broadcast JSON-RPC providers keyed by
//! `(chain, network)`, generalizing the teacher's `ProviderCache` (keyed by
//! `Network` alone, one chain family). Providers here carry no wallet filler:
//! signing happens offline in the Signing Worker against an explicit nonce
//! from the nonce coordinator, so broadcasting is `eth_sendRawTransaction`
//! against a plain [`RootProvider`].

use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use tower::ServiceBuilder;
use wdp_config::{ChainConfig, RpcEndpoint};
use wdp_types::{Chain, Network};

use crate::error::ChainError;

/// Builds the fallback-over-throttle RPC transport stack the teacher uses in
/// `Eip155ChainProvider::rpc_client`, generalized to any configured chain.
pub fn rpc_client(rpc: &[RpcEndpoint]) -> Result<RpcClient, ChainError> {
    let transports = rpc
        .iter()
        .map(|endpoint| {
            let rate_limit = endpoint.rate_limit.unwrap_or(u32::MAX);
            ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit))
                .service(Http::new(endpoint.http.clone()))
        })
        .collect::<Vec<_>>();
    let count = NonZeroUsize::new(transports.len())
        .ok_or_else(|| ChainError::Transport("no RPC endpoints configured".to_string()))?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(count))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}

/// Connected providers keyed by `(chain, network)`.
#[derive(Clone)]
pub struct ProviderCache {
    providers: HashMap<(Chain, Network), RootProvider>,
}

impl ProviderCache {
    pub async fn from_configs(chains: &[ChainConfig]) -> Result<Self, ChainError> {
        let mut providers = HashMap::new();
        for chain_config in chains {
            let client = rpc_client(&chain_config.rpc)?;
            let provider: RootProvider = ProviderBuilder::default().connect_client(client);
            providers.insert((chain_config.chain, chain_config.network), provider);
        }
        Ok(Self { providers })
    }

    pub fn by_chain(&self, chain: Chain, network: Network) -> Result<&RootProvider, ChainError> {
        self.providers
            .get(&(chain, network))
            .ok_or(ChainError::UnknownChain(chain, network))
    }
}

/// Current on-chain nonce for an address, used by the nonce coordinator's
/// gap-recovery phase and its initial allocator bootstrap (spec §4.3: "query
/// `eth_getTransactionCount(pending)`").
pub async fn pending_transaction_count(
    provider: &RootProvider,
    address: alloy_primitives::Address,
) -> Result<u64, ChainError> {
    provider
        .get_transaction_count(address)
        .pending()
        .await
        .map_err(|e| ChainError::Transport(e.to_string()))
}
