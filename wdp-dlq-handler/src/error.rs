//! DLQ Handler error taxonomy mapping (spec §4.5, §7).

use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error(transparent)]
    Storage(#[from] wdp_storage::StorageError),
    #[error(transparent)]
    Queue(#[from] wdp_queue::QueueError),
}

impl HasErrorKind for DlqError {
    fn kind(&self) -> ErrorKind {
        match self {
            DlqError::Storage(e) => match e {
                wdp_storage::StorageError::RequestNotFound(_)
                | wdp_storage::StorageError::SignedTxNotFound(_) => ErrorKind::NotFound,
                wdp_storage::StorageError::Conflict(_) => ErrorKind::Business,
                _ => ErrorKind::Network,
            },
            DlqError::Queue(_) => ErrorKind::Network,
        }
    }
}
