//! Broadcast Worker error taxonomy mapping (spec §4.3, §7).

use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error(transparent)]
    Storage(#[from] wdp_storage::StorageError),
    #[error(transparent)]
    Queue(#[from] wdp_queue::QueueError),
    #[error(transparent)]
    Chain(#[from] wdp_chain::ChainError),
    #[error(transparent)]
    Nonce(#[from] wdp_nonce::NonceError),
}

impl HasErrorKind for BroadcastError {
    fn kind(&self) -> ErrorKind {
        match self {
            BroadcastError::Storage(e) => match e {
                wdp_storage::StorageError::RequestNotFound(_)
                | wdp_storage::StorageError::SignedTxNotFound(_) => ErrorKind::NotFound,
                wdp_storage::StorageError::Conflict(_) => ErrorKind::Business,
                _ => ErrorKind::Network,
            },
            BroadcastError::Queue(_) => ErrorKind::Network,
            BroadcastError::Chain(e) => e.kind(),
            BroadcastError::Nonce(e) => e.kind(),
        }
    }
}

/// Classifies a raw RPC rejection string the way the teacher's
/// `Eip155ChainProvider` inspects node error messages, since alloy surfaces
/// these as opaque transport-error text rather than typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastRejection {
    /// `replacement transaction underpriced` / `already known` — the nonce
    /// is contested; bump gas and re-sign (spec §4.3 "stuck tx handling").
    Underpriced,
    /// Anything else: treat as a transient network failure.
    Other,
}

pub fn classify_rejection(message: &str) -> BroadcastRejection {
    let lower = message.to_ascii_lowercase();
    if lower.contains("underpriced") || lower.contains("already known") || lower.contains("replacement transaction") {
        BroadcastRejection::Underpriced
    } else {
        BroadcastRejection::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_underpriced_replacement() {
        assert_eq!(
            classify_rejection("replacement transaction underpriced"),
            BroadcastRejection::Underpriced
        );
        assert_eq!(
            classify_rejection("already known"),
            BroadcastRejection::Underpriced
        );
    }

    #[test]
    fn other_errors_are_not_reclassified() {
        assert_eq!(
            classify_rejection("connection refused"),
            BroadcastRejection::Other
        );
    }
}
