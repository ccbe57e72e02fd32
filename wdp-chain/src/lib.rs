//! EVM chain access: provider cache, signer pools, fee estimation, and
//! ERC-20/Multicall3 call encoding (SPEC_FULL.md §3, grounded on the
//! teacher's `provider_cache.rs` and `chain/eip155/provider.rs`).

pub mod broadcast;
pub mod erc20;
pub mod error;
pub mod fee_cache;
pub mod gas;
pub mod multicall;
pub mod provider_cache;
pub mod signer_set;
pub mod tx_builder;

pub use error::ChainError;
pub use fee_cache::FeeCache;
pub use provider_cache::ProviderCache;
pub use signer_set::SignerSet;
