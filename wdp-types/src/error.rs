//! The error taxonomy shared by every worker (spec §7).
//!
//! Each crate in the workspace defines its own `thiserror`-derived error enum
//! for its own failure modes, but every one of those errors maps onto one of
//! the nine kinds here via [`HasErrorKind::kind`]. Workers use `kind()` alone
//! to decide ack / nack / DLQ — they never match on the concrete error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy kinds (spec §7). Not a type hierarchy — a classification
/// used uniformly by every worker to decide propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input, unsupported token/chain. Terminal, not retried.
    Validation,
    /// Unused in core; reserved for the external auth boundary.
    Auth,
    /// Missing upstream record; terminal for that message.
    NotFound,
    /// Insufficient funds, duplicate request, over-limit. Terminal unless an
    /// operator intervenes; message is acknowledged.
    Business,
    /// Nonce gap, too-low, already-used. Recovered inside the broadcaster.
    Nonce,
    /// Underpriced / replacement transaction. Recovered via bump-and-resign.
    GasPrice,
    /// RPC or queue transient failure. Retried via nack -> redelivery -> DLQ.
    Network,
    /// Reverted on-chain. Terminal: mark FAILED, no automatic retry.
    Blockchain,
    /// Escalated via DLQ with a reduced retry budget.
    Unknown,
}

impl ErrorKind {
    /// Whether this kind should ever be retried by the DLQ handler.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Unknown)
    }

    /// Whether a worker should ack (drop) the message on this error,
    /// as opposed to nacking it for redelivery.
    pub fn is_terminal_for_message(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::NotFound
                | ErrorKind::Business
                | ErrorKind::Blockchain
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Business => "business",
            ErrorKind::Nonce => "nonce",
            ErrorKind::GasPrice => "gas_price",
            ErrorKind::Network => "network",
            ErrorKind::Blockchain => "blockchain",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Implemented by every crate-local error enum so workers can classify
/// failures without matching on concrete error types.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

/// A minimal, serializable error description carried on DLQ envelopes
/// (spec §6: `{errorKind, errorMessage, attempts}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
