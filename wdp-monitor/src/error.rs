//! Monitor error taxonomy mapping (spec §4.4, §7).

use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Storage(#[from] wdp_storage::StorageError),
    #[error(transparent)]
    Queue(#[from] wdp_queue::QueueError),
    #[error(transparent)]
    Chain(#[from] wdp_chain::ChainError),
}

impl HasErrorKind for MonitorError {
    fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Storage(e) => match e {
                wdp_storage::StorageError::RequestNotFound(_)
                | wdp_storage::StorageError::SignedTxNotFound(_) => ErrorKind::NotFound,
                wdp_storage::StorageError::Conflict(_) => ErrorKind::Business,
                _ => ErrorKind::Network,
            },
            MonitorError::Queue(_) => ErrorKind::Network,
            MonitorError::Chain(e) => e.kind(),
        }
    }
}
