//! Monitor: polls `getTransactionReceipt` for each broadcast transaction
//! with adaptive backoff until it reaches CONFIRMED or FAILED, tolerating
//! reorgs up to a bounded window (spec §4.4).

pub mod error;
pub mod receipt;
pub mod worker;

pub use error::MonitorError;
pub use receipt::{evaluate_receipt, is_reorg, reorg_window_exhausted, ReceiptFields, ReceiptOutcome};
pub use worker::{monitor_transaction, MonitorContext, MonitorOutcome};
