//! The configuration enum from spec §6, as typed, validated, defaulted
//! fields instead of scattered `process.env` reads (teacher Design Notes).

use serde::{Deserialize, Serialize};

/// Batching-engine tunables (spec §4.2, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Min per-token transfer count in a receive-cycle to consider batching.
    #[serde(default = "defaults::batch_threshold")]
    pub batch_threshold: usize,
    /// Min total messages in the receive-cycle, across the eligible group,
    /// for a batch to actually be emitted.
    #[serde(default = "defaults::min_batch_size")]
    pub min_batch_size: usize,
    /// Minimum projected gas savings (percent) required to choose BATCH.
    #[serde(default = "defaults::min_gas_savings_percent")]
    pub min_gas_savings_percent: u32,
    /// Flat per-transfer gas estimate used for the SINGLE-mode projection.
    #[serde(default = "defaults::single_tx_gas_estimate")]
    pub single_tx_gas_estimate: u64,
    /// Fixed base gas cost of one multicall invocation.
    #[serde(default = "defaults::batch_base_gas")]
    pub batch_base_gas: u64,
    /// Marginal gas cost per transfer folded into a multicall.
    #[serde(default = "defaults::batch_per_tx_gas")]
    pub batch_per_tx_gas: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_threshold: defaults::batch_threshold(),
            min_batch_size: defaults::min_batch_size(),
            min_gas_savings_percent: defaults::min_gas_savings_percent(),
            single_tx_gas_estimate: defaults::single_tx_gas_estimate(),
            batch_base_gas: defaults::batch_base_gas(),
            batch_per_tx_gas: defaults::batch_per_tx_gas(),
        }
    }
}

/// Gas-pricing tunables (spec §4.2, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasConfig {
    /// Percent tip added over the base fee for faster inclusion.
    #[serde(default = "defaults::gas_tip_percent")]
    pub tip_percent: u32,
    /// Percent safety buffer added to an estimated gas limit.
    #[serde(default = "defaults::gas_buffer_percent")]
    pub buffer_percent: u32,
    /// How long a cached fee-data sample remains valid (spec §4.2: 1s TTL).
    #[serde(default = "defaults::fee_cache_ttl_ms")]
    pub fee_cache_ttl_ms: u64,
    /// Multiplier applied per re-sign attempt when bumping an underpriced
    /// or stuck transaction (spec §4.3: "x1.1 per attempt").
    #[serde(default = "defaults::gas_bump_multiplier_permille")]
    pub gas_bump_multiplier_permille: u64,
    /// Ceiling multiplier (relative to the original fee, in permille) a
    /// bump sequence may not exceed (spec §4.3 "bounded by a policy
    /// ceiling").
    #[serde(default = "defaults::gas_bump_ceiling_permille")]
    pub gas_bump_ceiling_permille: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            tip_percent: defaults::gas_tip_percent(),
            buffer_percent: defaults::gas_buffer_percent(),
            fee_cache_ttl_ms: defaults::fee_cache_ttl_ms(),
            gas_bump_multiplier_permille: defaults::gas_bump_multiplier_permille(),
            gas_bump_ceiling_permille: defaults::gas_bump_ceiling_permille(),
        }
    }
}

/// DLQ retry-scheduling tunables (spec §4.5, §6; property P7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "defaults::initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "defaults::max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "defaults::retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    /// Smaller attempt bound applied to UNKNOWN-kind failures before they
    /// escalate (spec §4.5).
    #[serde(default = "defaults::unknown_max_retry_attempts")]
    pub unknown_max_retry_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: defaults::max_retry_attempts(),
            initial_retry_delay_ms: defaults::initial_retry_delay_ms(),
            max_retry_delay_ms: defaults::max_retry_delay_ms(),
            retry_backoff_multiplier: defaults::retry_backoff_multiplier(),
            unknown_max_retry_attempts: defaults::unknown_max_retry_attempts(),
        }
    }
}

/// Nonce-coordinator tunables (spec §4.3, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NonceConfig {
    /// How long a gap may remain unhealed before a filler transaction is
    /// issued (spec §4.3 `GAP_TIMEOUT`).
    #[serde(default = "defaults::nonce_gap_timeout_ms")]
    pub gap_timeout_ms: u64,
    /// How many redelivered messages the gap-search phase peeks at before
    /// giving up on finding the missing nonce in-queue.
    #[serde(default = "defaults::gap_search_peek_limit")]
    pub gap_search_peek_limit: usize,
    /// TTL for reusable nonces sitting in the pool (spec §3: 24h).
    #[serde(default = "defaults::nonce_pool_ttl_secs")]
    pub pool_ttl_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            gap_timeout_ms: defaults::nonce_gap_timeout_ms(),
            gap_search_peek_limit: defaults::gap_search_peek_limit(),
            pool_ttl_secs: defaults::nonce_pool_ttl_secs(),
        }
    }
}

/// Monitor polling tunables (spec §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Adaptive backoff stages in milliseconds (spec §4.4: "1s -> 5s -> 30s,
    /// capped").
    #[serde(default = "defaults::monitor_backoff_stages_ms")]
    pub backoff_stages_ms: [u64; 3],
    /// How long a transaction may remain pending before the alert hook
    /// fires (spec §4.4: "30-minute pending").
    #[serde(default = "defaults::pending_alert_after_secs")]
    pub pending_alert_after_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backoff_stages_ms: defaults::monitor_backoff_stages_ms(),
            pending_alert_after_secs: defaults::pending_alert_after_secs(),
        }
    }
}

pub mod defaults {
    pub fn batch_threshold() -> usize {
        3
    }
    pub fn min_batch_size() -> usize {
        5
    }
    pub fn min_gas_savings_percent() -> u32 {
        20
    }
    pub fn single_tx_gas_estimate() -> u64 {
        65_000
    }
    pub fn batch_base_gas() -> u64 {
        100_000
    }
    pub fn batch_per_tx_gas() -> u64 {
        25_000
    }
    pub fn gas_tip_percent() -> u32 {
        10
    }
    pub fn gas_buffer_percent() -> u32 {
        20
    }
    pub fn fee_cache_ttl_ms() -> u64 {
        1_000
    }
    pub fn gas_bump_multiplier_permille() -> u64 {
        1_100
    }
    pub fn gas_bump_ceiling_permille() -> u64 {
        3_000
    }
    pub fn max_retry_attempts() -> u32 {
        5
    }
    pub fn initial_retry_delay_ms() -> u64 {
        60_000
    }
    pub fn max_retry_delay_ms() -> u64 {
        6 * 60 * 60 * 1_000
    }
    pub fn retry_backoff_multiplier() -> f64 {
        2.0
    }
    pub fn unknown_max_retry_attempts() -> u32 {
        2
    }
    pub fn nonce_gap_timeout_ms() -> u64 {
        10_000
    }
    pub fn gap_search_peek_limit() -> usize {
        50
    }
    pub fn nonce_pool_ttl_secs() -> u64 {
        24 * 60 * 60
    }
    pub fn monitor_backoff_stages_ms() -> [u64; 3] {
        [1_000, 5_000, 30_000]
    }
    pub fn pending_alert_after_secs() -> u64 {
        30 * 60
    }
    pub fn batch_gas_limit_cap() -> u64 {
        5_000_000
    }
}
