//! Atomic Lua scripts executed on the shared Redis store (spec §4.3: "a
//! per-(chain, signer) crash-safe counter... atomic read-decide-write" is
//! the invariant these enforce). This is the cross-process equivalent of the
//! teacher's `PendingNonceManager` dashmap-of-mutexes, generalized from a
//! single-process cache to a shared allocator with a reuse pool.

use once_cell::sync::Lazy;
use redis::Script;

/// Allocates the next nonce for `(chain, signer)`: prefers the lowest value
/// sitting in the reuse pool (from a superseded/failed signed tx) over
/// growing the counter, then records the allocation in the pending set so
/// gap-search can find it later.
///
/// KEYS: [pool_key, pool_meta_key, counter_key, pending_key]
/// ARGV: [now_ms, bootstrap_nonce]
pub static ALLOCATE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local pool_key = KEYS[1]
        local pool_meta_key = KEYS[2]
        local counter_key = KEYS[3]
        local pending_key = KEYS[4]
        local now_ms = ARGV[1]
        local bootstrap_nonce = ARGV[2]

        local popped = redis.call('ZRANGE', pool_key, 0, 0)
        local nonce
        if #popped > 0 then
            nonce = popped[1]
            redis.call('ZREM', pool_key, nonce)
            redis.call('HDEL', pool_meta_key, nonce)
        else
            if redis.call('EXISTS', counter_key) == 0 then
                redis.call('SET', counter_key, bootstrap_nonce)
            end
            nonce = tostring(redis.call('INCR', counter_key) - 1)
        end
        redis.call('ZADD', pending_key, now_ms, nonce)
        return nonce
        "#,
    )
});

/// Returns a nonce to the reuse pool (a signed-but-never-broadcast or
/// superseded transaction), removing it from the pending set.
///
/// KEYS: [pool_key, pool_meta_key, pending_key]
/// ARGV: [nonce, now_ms]
pub static RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local pool_key = KEYS[1]
        local pool_meta_key = KEYS[2]
        local pending_key = KEYS[3]
        local nonce = ARGV[1]
        local now_ms = ARGV[2]

        redis.call('ZREM', pending_key, nonce)
        redis.call('ZADD', pool_key, tonumber(nonce), nonce)
        redis.call('HSET', pool_meta_key, nonce, now_ms)
        return 1
        "#,
    )
});

/// Marks a nonce confirmed on-chain, removing it from the pending set
/// permanently (it is never reused).
///
/// KEYS: [pending_key]
/// ARGV: [nonce]
pub static CONFIRM: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.call('ZREM', KEYS[1], ARGV[1])
        return 1
        "#,
    )
});

/// Drops reuse-pool entries older than `pool_ttl_secs` (spec §3: 24h TTL),
/// run periodically rather than per-allocation.
///
/// KEYS: [pool_key, pool_meta_key]
/// ARGV: [cutoff_ms]
pub static REAP_POOL: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local pool_key = KEYS[1]
        local pool_meta_key = KEYS[2]
        local cutoff_ms = tonumber(ARGV[1])

        local members = redis.call('ZRANGE', pool_key, 0, -1)
        local removed = {}
        for _, nonce in ipairs(members) do
            local inserted_at = tonumber(redis.call('HGET', pool_meta_key, nonce))
            if inserted_at ~= nil and inserted_at < cutoff_ms then
                redis.call('ZREM', pool_key, nonce)
                redis.call('HDEL', pool_meta_key, nonce)
                table.insert(removed, nonce)
            end
        end
        return removed
        "#,
    )
});

/// Records a signed transaction awaiting in-order broadcast in the shared
/// `pendingList` (spec §3/§6 `nonce:pending:{chain}:{signer}`), so a second
/// broadcast-worker instance for the same `(chain, signer)` key — or the
/// same instance after a restart — sees it without waiting on queue
/// redelivery.
///
/// KEYS: [pending_list_key]
/// ARGV: [nonce, signed_record_json]
pub static UPSERT_PENDING_RECORD: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
        return 1
        "#,
    )
});

/// Resolves a nonce out of the shared `pendingList` — either broadcast
/// succeeded or the underlying request was terminally failed — and advances
/// `lastBroadcastedNonce` (spec §3/§6 `nonce:last:{chain}:{signer}`) if
/// `nonce` is past the current watermark. The watermark only ever moves
/// forward: a late-arriving resolution for an already-superseded nonce must
/// not roll it back.
///
/// KEYS: [pending_list_key, last_broadcasted_key]
/// ARGV: [nonce]
pub static RESOLVE_PENDING_RECORD: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local pending_key = KEYS[1]
        local last_key = KEYS[2]
        local nonce = tonumber(ARGV[1])

        redis.call('HDEL', pending_key, ARGV[1])
        local current = redis.call('GET', last_key)
        if not current or nonce > tonumber(current) then
            redis.call('SET', last_key, nonce)
        end
        return 1
        "#,
    )
});
