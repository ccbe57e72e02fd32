//! The storage seam [`NonceCoordinator`] runs its per-key operations against
//! (spec §4.3). [`RedisStore`] is the production implementation, executing
//! the atomic Lua scripts in [`crate::scripts`] on a shared Redis instance.
//! [`crate::fake::FakeStore`] reimplements the same operations in-process for
//! tests, mirroring the queue and storage crates' `Memory*` fakes.

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::error::NonceError;
use crate::scripts::{ALLOCATE, CONFIRM, REAP_POOL, RELEASE, RESOLVE_PENDING_RECORD, UPSERT_PENDING_RECORD};

/// One allocate/release/confirm/reap/pending-tracking operation per call,
/// parameterized so [`NonceCoordinator`](crate::coordinator::NonceCoordinator)
/// can run the same sequence against Redis or an in-memory fake.
#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn allocate(
        &self,
        chain_id: u64,
        address: Address,
        now_ms: i64,
        bootstrap_nonce: u64,
    ) -> Result<u64, NonceError>;

    async fn release(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        now_ms: i64,
    ) -> Result<(), NonceError>;

    async fn confirm(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError>;

    async fn stale_pending(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<Vec<u64>, NonceError>;

    async fn reap_pool(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<usize, NonceError>;

    async fn record_pending(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        record_json: &str,
    ) -> Result<(), NonceError>;

    async fn resolve_pending(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError>;

    async fn load_broadcast_state(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<(Option<u64>, Vec<(u64, String)>), NonceError>;
}

fn counter_key(chain_id: u64, address: Address) -> String {
    format!("wdp:nonce:{chain_id}:{address}:counter")
}

fn pool_key(chain_id: u64, address: Address) -> String {
    format!("wdp:nonce:{chain_id}:{address}:pool")
}

fn pool_meta_key(chain_id: u64, address: Address) -> String {
    format!("wdp:nonce:{chain_id}:{address}:pool:meta")
}

fn pending_key(chain_id: u64, address: Address) -> String {
    format!("wdp:nonce:{chain_id}:{address}:pending")
}

/// Spec §3/§6: `lastBroadcastedNonce`, the persisted watermark below which
/// every nonce for this `(chain, signer)` has been broadcast (or resolved as
/// terminally failed).
fn last_broadcasted_key(chain_id: u64, address: Address) -> String {
    format!("nonce:last:{chain_id}:{address}")
}

/// Spec §3/§6: `pendingList`, signed transactions buffered awaiting their
/// turn to broadcast in nonce order. Stored as a hash (nonce → JSON
/// `SignedRecord`) rather than a Redis list, since entries are removed by
/// key (nonce) as they resolve, not strictly from one end.
fn pending_list_key(chain_id: u64, address: Address) -> String {
    format!("nonce:pending:{chain_id}:{address}")
}

/// Production [`NonceStore`]: every operation is one round-trip running an
/// atomic Lua script (or, for the two read-only lookups, plain commands —
/// nothing mutates in those two).
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, NonceError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl NonceStore for RedisStore {
    async fn allocate(
        &self,
        chain_id: u64,
        address: Address,
        now_ms: i64,
        bootstrap_nonce: u64,
    ) -> Result<u64, NonceError> {
        let mut conn = self.conn().await?;
        let nonce: String = ALLOCATE
            .key(pool_key(chain_id, address))
            .key(pool_meta_key(chain_id, address))
            .key(counter_key(chain_id, address))
            .key(pending_key(chain_id, address))
            .arg(now_ms)
            .arg(bootstrap_nonce)
            .invoke_async(&mut conn)
            .await?;
        nonce
            .parse()
            .map_err(|_| NonceError::Bootstrap(format!("malformed nonce returned: {nonce}")))
    }

    async fn release(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        now_ms: i64,
    ) -> Result<(), NonceError> {
        let mut conn = self.conn().await?;
        let _: () = RELEASE
            .key(pool_key(chain_id, address))
            .key(pool_meta_key(chain_id, address))
            .key(pending_key(chain_id, address))
            .arg(nonce)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn confirm(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError> {
        let mut conn = self.conn().await?;
        let _: () = CONFIRM
            .key(pending_key(chain_id, address))
            .arg(nonce)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn stale_pending(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<Vec<u64>, NonceError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(pending_key(chain_id, address))
            .arg("-inf")
            .arg(cutoff_ms)
            .query_async(&mut conn)
            .await?;
        Ok(members.into_iter().filter_map(|s| s.parse().ok()).collect())
    }

    async fn reap_pool(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<usize, NonceError> {
        let mut conn = self.conn().await?;
        let removed: Vec<String> = REAP_POOL
            .key(pool_key(chain_id, address))
            .key(pool_meta_key(chain_id, address))
            .arg(cutoff_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed.len())
    }

    async fn record_pending(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        record_json: &str,
    ) -> Result<(), NonceError> {
        let mut conn = self.conn().await?;
        let _: () = UPSERT_PENDING_RECORD
            .key(pending_list_key(chain_id, address))
            .arg(nonce)
            .arg(record_json)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn resolve_pending(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError> {
        let mut conn = self.conn().await?;
        let _: () = RESOLVE_PENDING_RECORD
            .key(pending_list_key(chain_id, address))
            .key(last_broadcasted_key(chain_id, address))
            .arg(nonce)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn load_broadcast_state(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<(Option<u64>, Vec<(u64, String)>), NonceError> {
        let mut conn = self.conn().await?;
        let last: Option<u64> = redis::cmd("GET")
            .arg(last_broadcasted_key(chain_id, address))
            .query_async(&mut conn)
            .await?;
        let raw: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(pending_list_key(chain_id, address))
            .query_async(&mut conn)
            .await?;
        let mut pending: Vec<(u64, String)> = raw
            .into_iter()
            .filter_map(|(nonce, json)| nonce.parse().ok().map(|n| (n, json)))
            .collect();
        pending.sort_by_key(|(nonce, _)| *nonce);
        Ok((last, pending))
    }
}
