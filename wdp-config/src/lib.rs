//! Typed, validated configuration for the withdrawal pipeline services
//! (spec §6), loaded from a JSON file located via CLI argument or `CONFIG`
//! env var, following the teacher's `Config::load` pattern.

pub mod literal_or_env;
pub mod signer;
pub mod tunables;

pub use literal_or_env::LiteralOrEnv;
pub use signer::{ChainConfig, EvmPrivateKey, RpcEndpoint, SignerConfig, SupportedToken};
pub use tunables::{BatchingConfig, GasConfig, MonitorConfig, NonceConfig, RetryConfig};

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;
use wdp_types::{Chain, Network};

#[derive(Parser, Debug)]
#[command(name = "withdrawal-pipeline")]
#[command(about = "Custodial withdrawal pipeline worker")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Coordination-store and durable-storage endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL backing the nonce coordinator and the
    /// Redis-backed `Queue` implementation (spec §4.3, §6).
    pub redis_url: Url,
    /// Postgres connection URL backing `withdrawal_requests` and the
    /// signed/sent transaction tables (spec §3, §6).
    pub database_url: String,
}

/// Top-level configuration shared by every worker binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    pub store: StoreConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub nonce: NonceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Up to how many messages a worker pulls per receive-cycle (spec §4.2
    /// default 10).
    #[serde(default = "defaults::receive_batch_size")]
    pub receive_batch_size: usize,
    /// Long-poll wait, in seconds, on queue receive (spec §4.2: up to 20s).
    #[serde(default = "defaults::long_poll_secs")]
    pub long_poll_secs: u64,
    /// Grace period for draining in-flight work during shutdown (spec §5).
    #[serde(default = "defaults::shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

mod defaults {
    pub fn receive_batch_size() -> usize {
        10
    }
    pub fn long_poll_secs() -> u64 {
        20
    }
    pub fn shutdown_grace_secs() -> u64 {
        30
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("no chain configuration for {0}:{1}")]
    UnknownChain(Chain, Network),
}

impl Config {
    /// Loads configuration from CLI arguments and a JSON file, following the
    /// teacher's `--config`/`CONFIG` resolution order.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        Self::load_from_path(&cli_args.config)
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Looks up the configuration for a `(chain, network)` pair (spec §4.1
    /// supported set).
    pub fn chain(&self, chain: Chain, network: Network) -> Result<&ChainConfig, ConfigError> {
        self.chains
            .iter()
            .find(|c| c.chain == chain && c.network == network)
            .ok_or(ConfigError::UnknownChain(chain, network))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config_from_json() {
        let json = r#"{
            "store": { "redis_url": "redis://localhost:6379", "database_url": "postgres://localhost/wdp" },
            "chains": [
                {
                    "chain": "polygon",
                    "network": "mainnet",
                    "signers": ["0xcafe000000000000000000000000000000000000000000000000000000000001"],
                    "rpc": [{ "http": "https://polygon-rpc.example" }],
                    "multicall_address": "0x0000000000000000000000000000000000000000"
                }
            ]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.receive_batch_size, 10);
        assert_eq!(config.batching.batch_threshold, 3);
        let chain = config.chain(Chain::Polygon, Network::Mainnet).unwrap();
        assert_eq!(chain.signers.len(), 1);
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let json = r#"{
            "store": { "redis_url": "redis://localhost:6379", "database_url": "postgres://localhost/wdp" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.chain(Chain::Bsc, Network::Mainnet).is_err());
    }
}
