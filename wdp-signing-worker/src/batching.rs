//! The per-receive-cycle batching decision (spec §4.2): partition
//! batch-eligible messages by `(chain, network, tokenAddress)`, then choose
//! BATCH or SINGLE per group by projected gas savings.

use wdp_config::BatchingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDecision {
    Single,
    Batch,
}

/// `gasSingle = single_tx_gas_estimate * n` (spec §4.2 default 65k/transfer).
pub fn projected_gas_single(group_size: usize, config: &BatchingConfig) -> u64 {
    config.single_tx_gas_estimate * group_size as u64
}

/// `gasBatch = batch_base_gas + batch_per_tx_gas * n` (spec §4.2 default
/// `100k + 25k*n`).
pub fn projected_gas_batch(group_size: usize, config: &BatchingConfig) -> u64 {
    config.batch_base_gas + config.batch_per_tx_gas * group_size as u64
}

/// Percent gas saved by batching vs. signing `group_size` transfers
/// individually. Zero (not negative) when batching costs more.
fn savings_percent(gas_single: u64, gas_batch: u64) -> u64 {
    if gas_single == 0 {
        return 0;
    }
    gas_single.saturating_sub(gas_batch) * 100 / gas_single
}

/// Decides BATCH vs SINGLE for one `(chain, network, tokenAddress)` group
/// (spec §4.2). Native-token transfers are always SINGLE — only ERC-20
/// transfers to the Multicall3-style aggregator are eligible. A batch must
/// also respect the chain's gas-limit safety margin.
pub fn decide(
    is_native: bool,
    group_size: usize,
    gas_limit_cap: u64,
    config: &BatchingConfig,
) -> BatchDecision {
    if is_native || group_size < config.batch_threshold {
        return BatchDecision::Single;
    }
    let gas_single = projected_gas_single(group_size, config);
    let gas_batch = projected_gas_batch(group_size, config);
    if gas_batch > gas_limit_cap {
        return BatchDecision::Single;
    }
    let savings = savings_percent(gas_single, gas_batch);
    if group_size >= config.min_batch_size && savings >= config.min_gas_savings_percent as u64 {
        BatchDecision::Batch
    } else {
        BatchDecision::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BatchingConfig {
        BatchingConfig::default()
    }

    #[test]
    fn native_transfers_are_always_single() {
        assert_eq!(
            decide(true, 10, 5_000_000, &config()),
            BatchDecision::Single
        );
    }

    #[test]
    fn below_threshold_is_single() {
        assert_eq!(decide(false, 2, 5_000_000, &config()), BatchDecision::Single);
    }

    #[test]
    fn five_transfers_meet_the_default_thresholds_and_batch() {
        // gasSingle = 65_000*5 = 325_000; gasBatch = 100_000 + 25_000*5 = 225_000
        // savings = (325000-225000)*100/325000 = 30% >= 20%, size 5 >= 5
        assert_eq!(decide(false, 5, 5_000_000, &config()), BatchDecision::Batch);
    }

    #[test]
    fn three_transfers_meet_threshold_but_not_min_batch_size() {
        assert_eq!(decide(false, 3, 5_000_000, &config()), BatchDecision::Single);
    }

    #[test]
    fn exceeding_the_gas_limit_cap_forces_single() {
        assert_eq!(decide(false, 100, 1_000, &config()), BatchDecision::Single);
    }
}
