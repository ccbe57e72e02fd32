//! Supported chains and networks (spec §1, §4.1: "`(chain, network)` is in
//! the supported set").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported blockchain. Polygon is primary; Ethereum and BSC are also
/// supported per spec §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Polygon,
    Ethereum,
    Bsc,
}

/// A network within a chain (mainnet or a chain-specific testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Chain::Polygon => "polygon",
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Chain {
    type Err = UnsupportedChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polygon" => Ok(Chain::Polygon),
            "ethereum" => Ok(Chain::Ethereum),
            "bsc" => Ok(Chain::Bsc),
            other => Err(UnsupportedChain(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Network {
    type Err = UnsupportedChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(UnsupportedChain(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported chain or network: {0}")]
pub struct UnsupportedChain(pub String);

/// A `(chain, network)` pair, the unit of support per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainNetwork {
    pub chain: Chain,
    pub network: Network,
}

impl ChainNetwork {
    pub const fn new(chain: Chain, network: Network) -> Self {
        Self { chain, network }
    }

    /// The EVM numeric chain ID (EIP-155) for this `(chain, network)` pair.
    ///
    /// Used to key the nonce coordinator's Redis state and to sign
    /// replay-protected transactions.
    pub fn evm_chain_id(&self) -> u64 {
        match (self.chain, self.network) {
            (Chain::Polygon, Network::Mainnet) => 137,
            (Chain::Polygon, Network::Testnet) => 80002, // Amoy
            (Chain::Ethereum, Network::Mainnet) => 1,
            (Chain::Ethereum, Network::Testnet) => 11155111, // Sepolia
            (Chain::Bsc, Network::Mainnet) => 56,
            (Chain::Bsc, Network::Testnet) => 97,
        }
    }

    /// Whether this chain supports EIP-1559 (type-2) fee markets.
    pub fn supports_eip1559(&self) -> bool {
        match self.chain {
            Chain::Polygon | Chain::Ethereum => true,
            Chain::Bsc => false,
        }
    }

    /// Default confirmations-required before a receipt is treated as final
    /// (spec §4.4 "CONFIRMATIONS (per chain)"). Conservative defaults,
    /// overridable via configuration (spec §9 open question).
    pub fn default_confirmations(&self) -> u64 {
        match self.chain {
            Chain::Polygon => 128,
            Chain::Ethereum => 12,
            Chain::Bsc => 15,
        }
    }

    /// Default reorg window in blocks (spec §4.4, §9 open question).
    pub fn default_reorg_window(&self) -> u64 {
        64
    }
}

impl fmt::Display for ChainNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_chains() {
        assert_eq!(Chain::from_str("polygon").unwrap(), Chain::Polygon);
        assert!(Chain::from_str("solana").is_err());
    }

    #[test]
    fn evm_chain_id_is_stable() {
        let cn = ChainNetwork::new(Chain::Polygon, Network::Mainnet);
        assert_eq!(cn.evm_chain_id(), 137);
    }
}
