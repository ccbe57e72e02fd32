//! Ingress-local error type (spec §4.1: "fail-fast with kind VALIDATION").

use wdp_types::ErrorKind;
use wdp_types::HasErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] wdp_types::AmountError),
    #[error("toAddress is not a valid EVM address: {0}")]
    InvalidAddress(String),
    #[error("tokenAddress {token} is not a known ERC-20 on {chain}:{network}")]
    UnknownToken {
        token: String,
        chain: wdp_types::Chain,
        network: wdp_types::Network,
    },
    #[error("unsupported chain/network: {0}:{1}")]
    UnsupportedChainNetwork(wdp_types::Chain, wdp_types::Network),
    #[error(transparent)]
    Storage(#[from] wdp_storage::StorageError),
    #[error(transparent)]
    Queue(#[from] wdp_queue::QueueError),
}

impl HasErrorKind for IngressError {
    fn kind(&self) -> ErrorKind {
        match self {
            IngressError::InvalidAmount(_)
            | IngressError::InvalidAddress(_)
            | IngressError::UnknownToken { .. }
            | IngressError::UnsupportedChainNetwork(..) => ErrorKind::Validation,
            IngressError::Storage(e) => match e {
                wdp_storage::StorageError::RequestNotFound(_) => ErrorKind::NotFound,
                wdp_storage::StorageError::Conflict(_) => ErrorKind::Business,
                _ => ErrorKind::Network,
            },
            IngressError::Queue(_) => ErrorKind::Network,
        }
    }
}
