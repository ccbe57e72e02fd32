//! Round-robin signer selection per `(chain, network)`, generalizing the
//! teacher's `Eip155ChainProvider::next_signer_address` (an `AtomicUsize`
//! cursor over `signer_addresses`) to load the custodial keys from
//! [`wdp_config::SignerConfig`] instead of a single wallet object.

use alloy_primitives::Address;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wdp_config::ChainConfig;
use wdp_types::{Chain, Network};

use crate::error::ChainError;

struct SignerPool {
    signers: Vec<PrivateKeySigner>,
    cursor: AtomicUsize,
}

impl SignerPool {
    fn next(&self) -> &PrivateKeySigner {
        debug_assert!(!self.signers.is_empty());
        if self.signers.len() == 1 {
            &self.signers[0]
        } else {
            let next = self.cursor.fetch_add(1, Ordering::Relaxed) % self.signers.len();
            &self.signers[next]
        }
    }
}

/// Custodial signers for every configured chain, selected round-robin to
/// spread broadcast load and avoid a single signer's nonce becoming a
/// bottleneck (spec §4.2, §4.3).
#[derive(Clone)]
pub struct SignerSet {
    pools: Arc<HashMap<(Chain, Network), SignerPool>>,
}

impl SignerSet {
    pub fn from_configs(chains: &[ChainConfig]) -> Result<Self, ChainError> {
        let mut pools = HashMap::new();
        for chain_config in chains {
            if chain_config.signers.is_empty() {
                return Err(ChainError::NoSigners(
                    chain_config.chain,
                    chain_config.network,
                ));
            }
            let chain_id = wdp_types::ChainNetwork::new(chain_config.chain, chain_config.network)
                .evm_chain_id();
            let signers = chain_config
                .signers
                .iter()
                .map(|key| {
                    let bytes = *key.inner().as_bytes();
                    PrivateKeySigner::from_bytes(&bytes.into())
                        .map(|s| s.with_chain_id(Some(chain_id)))
                        .map_err(|e| ChainError::InvalidSigner(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            pools.insert(
                (chain_config.chain, chain_config.network),
                SignerPool {
                    signers,
                    cursor: AtomicUsize::new(0),
                },
            );
        }
        Ok(Self {
            pools: Arc::new(pools),
        })
    }

    /// Selects the next signer for `(chain, network)` round-robin.
    pub fn next_signer(
        &self,
        chain: Chain,
        network: Network,
    ) -> Result<&PrivateKeySigner, ChainError> {
        self.pools
            .get(&(chain, network))
            .map(|pool| pool.next())
            .ok_or(ChainError::NoSigners(chain, network))
    }

    pub fn addresses(&self, chain: Chain, network: Network) -> Result<Vec<Address>, ChainError> {
        self.pools
            .get(&(chain, network))
            .map(|pool| pool.signers.iter().map(|s| s.address()).collect())
            .ok_or(ChainError::NoSigners(chain, network))
    }
}
