//! The cross-process nonce coordinator (spec §4.3). Generalizes the
//! teacher's `PendingNonceManager` — an in-process `DashMap<Address,
//! Arc<Mutex<u64>>>` cache with a `NONE` sentinel forcing a fresh
//! `eth_getTransactionCount(pending)` query — into a Redis-backed allocator
//! shared by every broadcast worker instance, with a reuse pool and
//! gap-detection state the single-process cache didn't need.

use alloy_primitives::Address;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::NonceError;
use crate::store::{NonceStore, RedisStore};

type LockKey = (u64, Address);

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Shared nonce allocator for every `(chain_id, signer address)` pair.
///
/// Holds a local `tokio::sync::Mutex` per key — mirroring the teacher's
/// dashmap-of-mutexes shape — so concurrent allocate calls within this
/// process serialize before touching the store at all, instead of relying
/// on the store's own atomicity alone to resolve in-process contention.
/// Generic over [`NonceStore`] so tests can swap in
/// [`crate::fake::FakeStore`]; every real caller uses the default
/// [`RedisStore`].
pub struct NonceCoordinator<S: NonceStore = RedisStore> {
    store: S,
    local_locks: DashMap<LockKey, Arc<Mutex<()>>>,
    /// Caches the bootstrap value per key so `eth_getTransactionCount` is
    /// only ever queried once per process per signer, the same "first call
    /// queries, subsequent calls use the cache" behavior as
    /// `PendingNonceManager::get_next_nonce`.
    bootstrap_cache: DashMap<LockKey, u64>,
}

impl NonceCoordinator<RedisStore> {
    pub fn new(client: redis::Client) -> Self {
        Self::with_store(RedisStore::new(client))
    }
}

impl<S: NonceStore> NonceCoordinator<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            local_locks: DashMap::new(),
            bootstrap_cache: DashMap::new(),
        }
    }

    fn local_lock(&self, key: LockKey) -> Arc<Mutex<()>> {
        self.local_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Allocates the next nonce for `(chain_id, address)`. `bootstrap` is
    /// only invoked the first time this process allocates for this key (or
    /// after [`Self::reset_bootstrap`]), matching the teacher's "query once,
    /// then increment a cache" pattern.
    pub async fn allocate<F, Fut>(
        &self,
        chain_id: u64,
        address: Address,
        bootstrap: F,
    ) -> Result<u64, NonceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, NonceError>>,
    {
        let key = (chain_id, address);
        let lock = self.local_lock(key);
        let _guard = lock.lock().await;

        let bootstrap_nonce = match self.bootstrap_cache.get(&key) {
            Some(v) => *v,
            None => {
                let v = bootstrap().await?;
                self.bootstrap_cache.insert(key, v);
                v
            }
        };

        self.store.allocate(chain_id, address, now_ms(), bootstrap_nonce).await
    }

    /// Forces the next [`Self::allocate`] call to re-query the chain,
    /// mirroring `PendingNonceManager::reset_nonce` — used after a broadcast
    /// fails in a way that leaves the true on-chain nonce uncertain.
    pub fn reset_bootstrap(&self, chain_id: u64, address: Address) {
        self.bootstrap_cache.remove(&(chain_id, address));
    }

    /// Returns an allocated-but-unused nonce to the reuse pool (spec §3
    /// noncePool): a signed transaction that was superseded before
    /// broadcast, or failed validation pre-flight.
    pub async fn release(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
    ) -> Result<(), NonceError> {
        self.store.release(chain_id, address, nonce, now_ms()).await
    }

    /// Marks a nonce confirmed on-chain; it is permanently retired, never
    /// reused.
    pub async fn confirm(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
    ) -> Result<(), NonceError> {
        self.store.confirm(chain_id, address, nonce).await
    }

    /// Nonces allocated longer than `gap_timeout` ago and still pending —
    /// candidates for the broadcast worker's gap-recovery filler transaction
    /// (spec §4.3 `GAP_TIMEOUT`).
    pub async fn stale_pending(
        &self,
        chain_id: u64,
        address: Address,
        gap_timeout: Duration,
    ) -> Result<Vec<u64>, NonceError> {
        let cutoff = now_ms() - gap_timeout.as_millis() as i64;
        self.store.stale_pending(chain_id, address, cutoff).await
    }

    /// Drops pool entries idle past `ttl` (spec §3: 24h default), run
    /// periodically by a maintenance task rather than per-allocation.
    pub async fn reap_pool(
        &self,
        chain_id: u64,
        address: Address,
        ttl: Duration,
    ) -> Result<usize, NonceError> {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        self.store.reap_pool(chain_id, address, cutoff).await
    }

    /// Buffers a signed transaction's JSON record in the shared `pendingList`
    /// (spec §3/§6) before attempting to broadcast it, so another worker
    /// instance — or this one after a restart — can see it's in flight for
    /// this `(chain, signer)` key without waiting on queue redelivery.
    pub async fn record_pending(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        record_json: &str,
    ) -> Result<(), NonceError> {
        self.store.record_pending(chain_id, address, nonce, record_json).await
    }

    /// Removes `nonce` from the shared `pendingList` and advances
    /// `lastBroadcastedNonce` past it if it isn't already (spec §3/§6),
    /// whether the resolution was a successful broadcast or a terminal
    /// failure — both retire the nonce from the ordering watermark's
    /// perspective.
    pub async fn resolve_pending(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
    ) -> Result<(), NonceError> {
        self.store.resolve_pending(chain_id, address, nonce).await
    }

    /// Loads the persisted `lastBroadcastedNonce` and every buffered
    /// `pendingList` record for `(chain, signer)`, ascending by nonce —
    /// used to rehydrate `BroadcastState` on worker startup (spec §3/§5:
    /// crash recovery and cross-process sharing of broadcast ordering
    /// state).
    pub async fn load_broadcast_state(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<(Option<u64>, Vec<(u64, String)>), NonceError> {
        self.store.load_broadcast_state(chain_id, address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeStore;
    use std::collections::HashSet;

    fn coordinator() -> NonceCoordinator<FakeStore> {
        NonceCoordinator::with_store(FakeStore::new())
    }

    async fn bootstrap(nonce: u64) -> Result<u64, NonceError> {
        Ok(nonce)
    }

    #[tokio::test]
    async fn p2_concurrent_allocations_never_collide() {
        let coordinator = Arc::new(coordinator());
        let address = Address::ZERO;
        let chain_id = 137;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let nonce = handle.await.unwrap();
            assert!(seen.insert(nonce), "nonce {nonce} allocated twice");
        }
        // No gap: the 50 allocations must exactly cover 0..50.
        assert_eq!(seen, (0..50).collect::<HashSet<_>>());
    }

    #[tokio::test]
    async fn p3_sequential_allocations_are_strictly_ascending() {
        let coordinator = coordinator();
        let address = Address::ZERO;
        let chain_id = 137;

        let mut last = None;
        for _ in 0..10 {
            let nonce = coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap();
            if let Some(prev) = last {
                assert!(nonce > prev, "nonce {nonce} did not strictly exceed {prev}");
            }
            last = Some(nonce);
        }
    }

    #[tokio::test]
    async fn p3_released_nonce_is_reused_before_growing_the_counter() {
        let coordinator = coordinator();
        let address = Address::ZERO;
        let chain_id = 137;

        let first = coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap();
        let second = coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap();
        coordinator.release(chain_id, address, second).await.unwrap();

        let reused = coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap();
        assert_eq!(reused, second, "released nonce should be reused ahead of the counter");

        let next = coordinator.allocate(chain_id, address, || bootstrap(0)).await.unwrap();
        assert!(next > first && next != second);
    }

    #[tokio::test]
    async fn p5_resolving_the_same_nonce_twice_is_idempotent() {
        let coordinator = coordinator();
        let address = Address::ZERO;
        let chain_id = 137;

        coordinator
            .record_pending(chain_id, address, 5, "{}")
            .await
            .unwrap();
        coordinator.resolve_pending(chain_id, address, 5).await.unwrap();
        coordinator.resolve_pending(chain_id, address, 5).await.unwrap();

        let (last, pending) = coordinator.load_broadcast_state(chain_id, address).await.unwrap();
        assert_eq!(last, Some(5));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn p5_resolve_never_moves_the_watermark_backward() {
        let coordinator = coordinator();
        let address = Address::ZERO;
        let chain_id = 137;

        coordinator.resolve_pending(chain_id, address, 10).await.unwrap();
        coordinator.resolve_pending(chain_id, address, 3).await.unwrap();

        let (last, _) = coordinator.load_broadcast_state(chain_id, address).await.unwrap();
        assert_eq!(last, Some(10), "a stale resolution must not roll the watermark back");
    }
}
