//! A short-TTL cache of fee data, avoiding an RPC round trip per withdrawal
//! in a receive-cycle (SPEC_FULL.md §3: "how long a cached fee-data sample
//! remains valid — spec §4.2: 1s TTL").

use alloy_provider::{Provider, RootProvider};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use wdp_config::GasConfig;
use wdp_types::{Chain, GasParams, Network};

use crate::error::ChainError;

#[derive(Clone, Copy)]
struct CachedFee {
    params: RawFee,
    fetched_at: Instant,
}

#[derive(Clone, Copy)]
enum RawFee {
    Eip1559 {
        base_fee_per_gas: u128,
    },
    Legacy {
        gas_price: u128,
    },
}

/// Caches the last-observed fee sample per `(chain, network)` for
/// `fee_cache_ttl_ms` (spec default 1000ms), recomputing the tip/buffer
/// markup on every read so a policy change takes effect without waiting out
/// the cache.
pub struct FeeCache {
    entries: DashMap<(Chain, Network), CachedFee>,
}

impl Default for FeeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FeeCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub async fn gas_params(
        &self,
        provider: &RootProvider,
        chain: Chain,
        network: Network,
        eip1559: bool,
        config: &GasConfig,
    ) -> Result<GasParams, ChainError> {
        let ttl = Duration::from_millis(config.fee_cache_ttl_ms);
        let key = (chain, network);

        let cached = self.entries.get(&key).and_then(|entry| {
            if entry.fetched_at.elapsed() < ttl {
                Some(entry.params)
            } else {
                None
            }
        });

        let raw = match cached {
            Some(raw) => raw,
            None => {
                let raw = if eip1559 {
                    let base_fee_per_gas = provider
                        .get_gas_price()
                        .await
                        .map_err(|e| ChainError::Transport(e.to_string()))?;
                    RawFee::Eip1559 { base_fee_per_gas }
                } else {
                    let gas_price = provider
                        .get_gas_price()
                        .await
                        .map_err(|e| ChainError::Transport(e.to_string()))?;
                    RawFee::Legacy { gas_price }
                };
                self.entries.insert(
                    key,
                    CachedFee {
                        params: raw,
                        fetched_at: Instant::now(),
                    },
                );
                raw
            }
        };

        Ok(apply_markup(raw, config))
    }
}

fn apply_markup(raw: RawFee, config: &GasConfig) -> GasParams {
    match raw {
        RawFee::Eip1559 { base_fee_per_gas } => {
            let tip = base_fee_per_gas * config.tip_percent as u128 / 100;
            let max_priority_fee_per_gas = tip.max(1);
            let max_fee_per_gas = base_fee_per_gas + max_priority_fee_per_gas * 2;
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            }
        }
        RawFee::Legacy { gas_price } => {
            let bumped = gas_price + gas_price * config.tip_percent as u128 / 100;
            GasParams::Legacy { gas_price: bumped }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eip1559_markup_adds_tip_over_base_fee() {
        let config = GasConfig {
            tip_percent: 10,
            buffer_percent: 20,
            fee_cache_ttl_ms: 1_000,
            gas_bump_multiplier_permille: 1_100,
            gas_bump_ceiling_permille: 3_000,
        };
        let params = apply_markup(
            RawFee::Eip1559 {
                base_fee_per_gas: 100,
            },
            &config,
        );
        match params {
            GasParams::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                assert_eq!(max_priority_fee_per_gas, 10);
                assert_eq!(max_fee_per_gas, 120);
            }
            _ => panic!("expected eip1559 params"),
        }
    }
}
