//! Signing Worker error taxonomy mapping (spec §4.2, §7).

use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("request {0} is not PENDING, refusing to sign")]
    NotPending(wdp_types::RequestId),
    #[error("request {0} has an invalid amount: {1}")]
    InvalidAmount(wdp_types::RequestId, wdp_types::AmountError),
    #[error(transparent)]
    Storage(#[from] wdp_storage::StorageError),
    #[error(transparent)]
    Queue(#[from] wdp_queue::QueueError),
    #[error(transparent)]
    Chain(#[from] wdp_chain::ChainError),
    #[error(transparent)]
    Nonce(#[from] wdp_nonce::NonceError),
}

impl HasErrorKind for SigningError {
    fn kind(&self) -> ErrorKind {
        match self {
            SigningError::NotPending(_) => ErrorKind::Business,
            SigningError::InvalidAmount(..) => ErrorKind::Validation,
            SigningError::Storage(e) => match e {
                wdp_storage::StorageError::RequestNotFound(_) => ErrorKind::NotFound,
                wdp_storage::StorageError::Conflict(_) => ErrorKind::Business,
                _ => ErrorKind::Network,
            },
            SigningError::Queue(_) => ErrorKind::Network,
            SigningError::Chain(e) => e.kind(),
            SigningError::Nonce(e) => e.kind(),
        }
    }
}
