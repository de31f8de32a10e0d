//! Redis-backed implementation of the scheduler's leader lock.
//!
//! The lock record is a single key holding the current holder id with a
//! millisecond TTL; the fencing counter lives beside it and is bumped with
//! `INCR` on every ownership change. Acquisition uses `SET NX PX` so the
//! take-if-free step is atomic on the server, and renew/release run as
//! holder-compare Lua scripts so a rival who takes the key after our TTL
//! lapses can never have its lock extended or deleted by us.

use std::time::Duration;

use fred::interfaces::LuaInterface;
use fred::prelude::*;

use pandemos_core::error::LockError;
use pandemos_core::lock::LeaderLock;

use crate::redis::RedisPool;

/// Key holding the current lock holder id.
const LOCK_KEY: &str = "pandemos:leader";

/// Key holding the monotonic fencing counter.
const FENCE_KEY: &str = "pandemos:leader:fence";

/// Extends the key's TTL only while `ARGV[1]` still holds it.
const RENEW_SCRIPT: &str = "if redis.call('GET', KEYS[1]) == ARGV[1] \
     then return redis.call('PEXPIRE', KEYS[1], ARGV[2]) else return 0 end";

/// Deletes the key only while `ARGV[1]` still holds it.
const RELEASE_SCRIPT: &str = "if redis.call('GET', KEYS[1]) == ARGV[1] \
     then return redis.call('DEL', KEYS[1]) else return 0 end";

/// Distributed leader lock over a Redis-compatible store.
#[derive(Clone)]
pub struct RedisLeaderLock {
    client: Client,
    lock_key: String,
    fence_key: String,
}

impl RedisLeaderLock {
    /// Create a lock sharing the pool's connection, on the default keys.
    pub fn new(pool: &RedisPool) -> Self {
        Self::with_keys(pool, LOCK_KEY, FENCE_KEY)
    }

    /// Create a lock on custom keys, for tests that need isolation.
    pub fn with_keys(pool: &RedisPool, lock_key: &str, fence_key: &str) -> Self {
        Self {
            client: pool.client().clone(),
            lock_key: lock_key.to_owned(),
            fence_key: fence_key.to_owned(),
        }
    }

    /// Extend the TTL iff `holder_id` still owns the lock. Returns whether
    /// the extension happened; the check and the write are one script, so
    /// no rival can slip in between them.
    async fn renew_if_held(&self, holder_id: &str, ttl_ms: i64) -> Result<bool, LockError> {
        let extended: i64 = self
            .client
            .eval(
                RENEW_SCRIPT,
                self.lock_key.as_str(),
                vec![holder_id.to_owned(), ttl_ms.to_string()],
            )
            .await
            .map_err(storage)?;
        Ok(extended == 1)
    }

    async fn current_fence(&self) -> Result<u64, LockError> {
        let value: Option<String> = self
            .client
            .get(self.fence_key.as_str())
            .await
            .map_err(storage)?;
        Ok(value.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0))
    }
}

impl LeaderLock for RedisLeaderLock {
    async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<Option<u64>, LockError> {
        let ttl_ms = ttl_millis(ttl);
        let taken: Option<String> = self
            .client
            .set(
                self.lock_key.as_str(),
                holder_id,
                Some(Expiration::PX(ttl_ms)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(storage)?;

        if taken.is_some() {
            let fence: i64 = self
                .client
                .incr(self.fence_key.as_str())
                .await
                .map_err(storage)?;
            return Ok(Some(u64::try_from(fence).unwrap_or(0)));
        }

        // Already held. A conditional extension succeeds only when the
        // holder is us; the fence is unchanged on re-acquisition.
        if self.renew_if_held(holder_id, ttl_ms).await? {
            Ok(Some(self.current_fence().await?))
        } else {
            Ok(None)
        }
    }

    async fn renew(&self, holder_id: &str, ttl: Duration) -> Result<(), LockError> {
        if self.renew_if_held(holder_id, ttl_millis(ttl)).await? {
            Ok(())
        } else {
            Err(LockError::Lost)
        }
    }

    async fn release(&self, holder_id: &str) -> Result<(), LockError> {
        let _removed: i64 = self
            .client
            .eval(
                RELEASE_SCRIPT,
                self.lock_key.as_str(),
                vec![holder_id.to_owned()],
            )
            .await
            .map_err(storage)?;
        Ok(())
    }
}

fn storage(err: fred::error::Error) -> LockError {
    LockError::Storage(err.to_string())
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}
