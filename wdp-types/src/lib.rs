//! Shared data model, error taxonomy, and queue message wire types for the
//! withdrawal pipeline.

pub mod chain;
pub mod error;
pub mod messages;
pub mod money;
pub mod request;
pub mod signed_tx;
pub mod status;

pub use chain::{Chain, ChainNetwork, Network};
pub use error::{ErrorDetail, ErrorKind, HasErrorKind};
pub use money::{parse_units, AmountError, BaseUnits};
pub use request::{BatchId, IllegalTransition, RequestId, WithdrawalRequest, NATIVE_TOKEN_SENTINEL};
pub use signed_tx::{GasParams, SentTransaction, SignedBatchTransaction, SignedSingleTransaction, SignedTxStatus};
pub use status::{ProcessingMode, WithdrawalStatus};
pub use messages::{BroadcastTxMessage, DlqMessage, SignedTxMessage, Subject, TxRequestMessage};
