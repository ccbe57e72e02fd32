//! An in-memory [`NonceStore`] for unit tests — reimplements each Lua
//! script's logic directly over process-local state instead of round-
//! tripping to Redis, the same role `wdp-queue::memory`/`wdp-storage::memory`
//! play for their traits.

use std::collections::BTreeMap;
use std::sync::Mutex;

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::NonceError;
use crate::store::NonceStore;

#[derive(Default)]
struct KeyState {
    counter: Option<u64>,
    /// nonce -> inserted_at_ms
    pool: BTreeMap<u64, i64>,
    /// nonce -> allocated_at_ms
    pending: BTreeMap<u64, i64>,
    /// nonce -> JSON `SignedRecord`
    pending_list: BTreeMap<u64, String>,
    last_broadcasted: Option<u64>,
}

/// Process-local stand-in for the Redis-backed coordination store, keyed the
/// same way as [`crate::store::RedisStore`] (`(chainId, address)`).
#[derive(Default)]
pub struct FakeStore(DashMap<(u64, Address), Mutex<KeyState>>);

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(
        &self,
        chain_id: u64,
        address: Address,
    ) -> dashmap::mapref::one::RefMut<'_, (u64, Address), Mutex<KeyState>> {
        self.0
            .entry((chain_id, address))
            .or_insert_with(|| Mutex::new(KeyState::default()))
    }
}

#[async_trait]
impl NonceStore for FakeStore {
    async fn allocate(
        &self,
        chain_id: u64,
        address: Address,
        now_ms: i64,
        bootstrap_nonce: u64,
    ) -> Result<u64, NonceError> {
        let entry = self.entry(chain_id, address);
        let mut state = entry.lock().unwrap();
        let nonce = if let Some((&nonce, _)) = state.pool.iter().next() {
            state.pool.remove(&nonce);
            nonce
        } else {
            let nonce = *state.counter.get_or_insert(bootstrap_nonce);
            state.counter = Some(nonce + 1);
            nonce
        };
        state.pending.insert(nonce, now_ms);
        Ok(nonce)
    }

    async fn release(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        now_ms: i64,
    ) -> Result<(), NonceError> {
        let entry = self.entry(chain_id, address);
        let mut state = entry.lock().unwrap();
        state.pending.remove(&nonce);
        state.pool.insert(nonce, now_ms);
        Ok(())
    }

    async fn confirm(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError> {
        let entry = self.entry(chain_id, address);
        entry.lock().unwrap().pending.remove(&nonce);
        Ok(())
    }

    async fn stale_pending(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<Vec<u64>, NonceError> {
        let entry = self.entry(chain_id, address);
        let state = entry.lock().unwrap();
        Ok(state
            .pending
            .iter()
            .filter(|(_, &allocated_at)| allocated_at <= cutoff_ms)
            .map(|(&nonce, _)| nonce)
            .collect())
    }

    async fn reap_pool(
        &self,
        chain_id: u64,
        address: Address,
        cutoff_ms: i64,
    ) -> Result<usize, NonceError> {
        let entry = self.entry(chain_id, address);
        let mut state = entry.lock().unwrap();
        let stale: Vec<u64> = state
            .pool
            .iter()
            .filter(|(_, &inserted_at)| inserted_at < cutoff_ms)
            .map(|(&nonce, _)| nonce)
            .collect();
        for nonce in &stale {
            state.pool.remove(nonce);
        }
        Ok(stale.len())
    }

    async fn record_pending(
        &self,
        chain_id: u64,
        address: Address,
        nonce: u64,
        record_json: &str,
    ) -> Result<(), NonceError> {
        let entry = self.entry(chain_id, address);
        entry
            .lock()
            .unwrap()
            .pending_list
            .insert(nonce, record_json.to_string());
        Ok(())
    }

    async fn resolve_pending(&self, chain_id: u64, address: Address, nonce: u64) -> Result<(), NonceError> {
        let entry = self.entry(chain_id, address);
        let mut state = entry.lock().unwrap();
        state.pending_list.remove(&nonce);
        if state.last_broadcasted.map(|last| nonce > last).unwrap_or(true) {
            state.last_broadcasted = Some(nonce);
        }
        Ok(())
    }

    async fn load_broadcast_state(
        &self,
        chain_id: u64,
        address: Address,
    ) -> Result<(Option<u64>, Vec<(u64, String)>), NonceError> {
        let entry = self.entry(chain_id, address);
        let state = entry.lock().unwrap();
        Ok((
            state.last_broadcasted,
            state
                .pending_list
                .iter()
                .map(|(&nonce, json)| (nonce, json.clone()))
                .collect(),
        ))
    }
}
