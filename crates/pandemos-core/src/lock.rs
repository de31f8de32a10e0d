//! Distributed mutual exclusion for the tick scheduler.
//!
//! [`LeaderLock`] is the seam between the scheduler and whatever store
//! backs the lock record: acquire/renew/release with a TTL and a fencing
//! token that increases on every ownership change. The renew-before-expiry
//! discipline must hold regardless of backing store.
//!
//! [`LocalLeaderLock`] is the in-process implementation used by tests and
//! single-node runs; the Redis-backed implementation lives in
//! `pandemos-db`.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::error::LockError;

/// Retry attempts for transient lock storage failures.
pub const LOCK_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff delay between lock retries; doubles per attempt.
pub const LOCK_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// A distributed mutual-exclusion primitive with expiry.
///
/// At most one holder exists cluster-wide at any instant. A caller that
/// cannot determine the lock state (storage failure, exhausted retries)
/// must treat the lock as unavailable, never as held.
pub trait LeaderLock {
    /// Try to acquire the lock for `holder_id` with the given TTL.
    ///
    /// Succeeds only if no unexpired holder exists or the caller already
    /// holds the lock (which extends the TTL). Returns the fencing token
    /// on success or `None` when another holder is active.
    fn acquire(
        &self,
        holder_id: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<Option<u64>, LockError>> + Send;

    /// Extend the TTL of a lock the caller currently holds.
    ///
    /// Fails with [`LockError::Lost`] if another holder has acquired the
    /// lock since.
    fn renew(
        &self,
        holder_id: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), LockError>> + Send;

    /// Clear the lock record if still held by the caller. Releasing a
    /// lock held by someone else is a no-op.
    fn release(&self, holder_id: &str) -> impl Future<Output = Result<(), LockError>> + Send;
}

/// The single lock slot behind [`LocalLeaderLock`].
#[derive(Debug, Default)]
struct Slot {
    holder: Option<String>,
    fence: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_held_by_other(&self, holder_id: &str, now: Instant) -> bool {
        match (&self.holder, self.expires_at) {
            (Some(holder), Some(expires_at)) => holder != holder_id && expires_at > now,
            _ => false,
        }
    }
}

/// In-process leader lock for tests and single-node runs.
#[derive(Debug, Default)]
pub struct LocalLeaderLock {
    slot: Mutex<Slot>,
}

impl LocalLeaderLock {
    /// Create an unheld lock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LeaderLock for LocalLeaderLock {
    async fn acquire(&self, holder_id: &str, ttl: Duration) -> Result<Option<u64>, LockError> {
        let now = Instant::now();
        let mut slot = self.slot.lock().await;

        if slot.is_held_by_other(holder_id, now) {
            return Ok(None);
        }

        let already_held = slot.holder.as_deref() == Some(holder_id)
            && slot.expires_at.is_some_and(|at| at > now);
        if !already_held {
            slot.fence = slot.fence.saturating_add(1);
            slot.holder = Some(holder_id.to_owned());
        }
        slot.expires_at = Some(now.checked_add(ttl).unwrap_or(now));
        Ok(Some(slot.fence))
    }

    async fn renew(&self, holder_id: &str, ttl: Duration) -> Result<(), LockError> {
        let now = Instant::now();
        let mut slot = self.slot.lock().await;

        let held = slot.holder.as_deref() == Some(holder_id)
            && slot.expires_at.is_some_and(|at| at > now);
        if !held {
            return Err(LockError::Lost);
        }
        slot.expires_at = Some(now.checked_add(ttl).unwrap_or(now));
        Ok(())
    }

    async fn release(&self, holder_id: &str) -> Result<(), LockError> {
        let mut slot = self.slot.lock().await;
        if slot.holder.as_deref() == Some(holder_id) {
            slot.holder = None;
            slot.expires_at = None;
        }
        Ok(())
    }
}

/// Run a lock operation with bounded exponential backoff on transient
/// storage failures. [`LockError::Lost`] is never retried.
pub async fn retry_lock_op<T, F, Fut>(
    op: &str,
    attempts: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, LockError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LockError>>,
{
    let mut delay = base_delay;
    let mut last_message = String::from("no attempts made");

    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(LockError::Storage(message)) => {
                warn!(op, attempt, error = %message, "lock operation failed, backing off");
                last_message = message;
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(other) => return Err(other),
        }
    }

    Err(LockError::Storage(last_message))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn acquire_then_contender_fails() {
        let lock = LocalLeaderLock::new();
        let fence = lock.acquire("a", TTL).await.unwrap();
        assert!(fence.is_some());

        let contender = lock.acquire("b", TTL).await.unwrap();
        assert_eq!(contender, None);
    }

    #[tokio::test]
    async fn reacquire_by_holder_keeps_fence() {
        let lock = LocalLeaderLock::new();
        let first = lock.acquire("a", TTL).await.unwrap();
        let second = lock.acquire("a", TTL).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_is_reclaimable_with_new_fence() {
        let lock = LocalLeaderLock::new();
        let first = lock.acquire("a", Duration::from_millis(100)).await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;

        let second = lock.acquire("b", TTL).await.unwrap();
        assert!(second.is_some());
        assert!(second > first);
    }

    #[tokio::test]
    async fn renew_by_holder_succeeds() {
        let lock = LocalLeaderLock::new();
        let _ = lock.acquire("a", TTL).await.unwrap();
        assert!(lock.renew("a", TTL).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn renew_after_takeover_reports_lost() {
        let lock = LocalLeaderLock::new();
        let _ = lock.acquire("a", Duration::from_millis(100)).await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        let _ = lock.acquire("b", TTL).await.unwrap();

        assert_eq!(lock.renew("a", TTL).await, Err(LockError::Lost));
    }

    #[tokio::test]
    async fn release_frees_the_lock() {
        let lock = LocalLeaderLock::new();
        let _ = lock.acquire("a", TTL).await.unwrap();
        lock.release("a").await.unwrap();

        let next = lock.acquire("b", TTL).await.unwrap();
        assert!(next.is_some());
    }

    #[tokio::test]
    async fn release_by_non_holder_is_noop() {
        let lock = LocalLeaderLock::new();
        let _ = lock.acquire("a", TTL).await.unwrap();
        lock.release("b").await.unwrap();

        assert_eq!(lock.acquire("b", TTL).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_storage_errors() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry_lock_op("test", 3, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LockError::Storage(String::from("flaky")))
                } else {
                    Ok(7_u64)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn retry_does_not_mask_lost() {
        let result: Result<(), _> = retry_lock_op("test", 3, Duration::from_millis(1), || async {
            Err(LockError::Lost)
        })
        .await;
        assert_eq!(result, Err(LockError::Lost));
    }
}
