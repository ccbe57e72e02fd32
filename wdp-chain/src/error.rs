//! Error taxonomy mapping for chain-access failures (spec §7).

use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("no provider configured for {0}:{1}")]
    UnknownChain(wdp_types::Chain, wdp_types::Network),
    #[error("no signers configured for {0}:{1}")]
    NoSigners(wdp_types::Chain, wdp_types::Network),
    #[error("invalid private key: {0}")]
    InvalidSigner(String),
    #[error("RPC transport error: {0}")]
    Transport(String),
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),
    #[error("transaction signing failed: {0}")]
    Signing(String),
    #[error("transaction reverted on-chain: {0}")]
    Reverted(String),
}

impl HasErrorKind for ChainError {
    fn kind(&self) -> ErrorKind {
        match self {
            ChainError::UnknownChain(..) | ChainError::NoSigners(..) => ErrorKind::Validation,
            ChainError::InvalidSigner(_) | ChainError::Signing(_) => ErrorKind::Business,
            ChainError::Transport(_) => ErrorKind::Network,
            ChainError::GasEstimation(_) => ErrorKind::GasPrice,
            ChainError::Reverted(_) => ErrorKind::Blockchain,
        }
    }
}
