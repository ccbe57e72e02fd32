//! Broadcast Worker: orders signed transactions by nonce per `(chain,
//! signer)`, submits them to the chain, heals nonce gaps with filler
//! transactions, and re-signs stuck sends with bumped gas (spec §4.3).

pub mod dispatch;
pub mod error;
pub mod state;

pub use dispatch::{
    drain_pending, enqueue_and_drain, gap_has_timed_out, issue_gap_filler, mark_failed, BroadcastContext,
    DrainOutcome,
};
pub use error::BroadcastError;
pub use state::{BroadcastRegistry, BroadcastState, PendingEntry};
