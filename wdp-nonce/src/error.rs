use wdp_types::{ErrorKind, HasErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to bootstrap nonce from chain: {0}")]
    Bootstrap(String),
    #[error("nonce {0} is not currently pending for {1:?}")]
    NotPending(u64, alloy_primitives::Address),
}

impl HasErrorKind for NonceError {
    fn kind(&self) -> ErrorKind {
        match self {
            NonceError::Redis(_) => ErrorKind::Network,
            NonceError::Bootstrap(_) => ErrorKind::Network,
            NonceError::NotPending(..) => ErrorKind::Nonce,
        }
    }
}
