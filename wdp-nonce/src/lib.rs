//! Cross-process nonce coordination for the Broadcast Worker (spec §4.3).

pub mod coordinator;
pub mod error;
pub mod fake;
mod scripts;
pub mod store;

pub use coordinator::NonceCoordinator;
pub use error::NonceError;
pub use store::{NonceStore, RedisStore};
