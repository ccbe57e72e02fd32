//! Signing Worker: validates, batches, and signs withdrawal requests,
//! acquiring gas parameters and nonces before handing raw transactions to the
//! Broadcast Worker (spec §4.2).

pub mod batching;
pub mod error;
pub mod worker;

pub use error::SigningError;
pub use worker::{group_by_token, partition_group, sign_batch, sign_single, SigningContext};
