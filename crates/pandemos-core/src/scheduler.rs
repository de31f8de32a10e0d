//! The leader-exclusive tick scheduler.
//!
//! One scheduler instance runs per process; the leader lock guarantees at
//! most one of them commits ticks at any instant. A wake that cannot take
//! the lock skips without consuming a tick id, so committed ids stay
//! gapless: each successful tick is exactly one past the last audit entry.
//!
//! A tick that loses the lock or overruns its time limit aborts before
//! commit with no partial effect; the same id is retried on the next wake.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use pandemos_model::seed::tick_seed;
use pandemos_model::spread::{self, SpreadParams};
use pandemos_model::topology::RegionGraph;
use pandemos_types::{TickDiff, TickRecord, TickStats};

use crate::audit::AuditLog;
use crate::broadcast::DiffBroadcaster;
use crate::config::TickConfig;
use crate::error::{LockError, TickError};
use crate::lock::{LOCK_RETRY_ATTEMPTS, LOCK_RETRY_BASE_DELAY, LeaderLock, retry_lock_op};
use crate::store::RegionStateStore;

/// The result of one scheduler wake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick committed; the record is already in the audit log.
    Committed(TickRecord),
    /// Another instance holds the leader lock; no tick id was consumed.
    Skipped,
}

/// Drives the global state forward one tick at a time while holding the
/// leader lock.
#[derive(Debug)]
pub struct TickScheduler<L> {
    lock: Arc<L>,
    store: Arc<RegionStateStore>,
    audit: Arc<AuditLog>,
    broadcaster: DiffBroadcaster,
    graph: Arc<RegionGraph>,
    config: TickConfig,
    spread: SpreadParams,
    holder_id: String,
}

impl<L: LeaderLock + Send + Sync> TickScheduler<L> {
    /// Create a scheduler. `holder_id` identifies this instance in the
    /// lock record and must be unique per process.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: Arc<L>,
        store: Arc<RegionStateStore>,
        audit: Arc<AuditLog>,
        broadcaster: DiffBroadcaster,
        graph: Arc<RegionGraph>,
        config: TickConfig,
        spread: SpreadParams,
        holder_id: impl Into<String>,
    ) -> Self {
        Self {
            lock,
            store,
            audit,
            broadcaster,
            graph,
            config,
            spread,
            holder_id: holder_id.into(),
        }
    }

    /// Run the scheduler until the shutdown signal flips.
    ///
    /// Aborted and skipped ticks are logged and the loop continues; the
    /// leader lock is released on the way out so a standby instance can
    /// take over immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.interval_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(holder_id = %self.holder_id, "tick scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => match self.run_once().await {
                    Ok(TickOutcome::Committed(record)) => {
                        info!(
                            tick_id = record.tick_id,
                            regions_changed = record.stats.regions_changed,
                            actions = record.stats.actions_since_last,
                            "tick committed"
                        );
                    }
                    Ok(TickOutcome::Skipped) => {
                        debug!("tick skipped, leader lock held elsewhere");
                    }
                    Err(err) => {
                        warn!(error = %err, "tick aborted without commit");
                    }
                },
                _ = shutdown.changed() => {
                    if let Err(err) = self.lock.release(&self.holder_id).await {
                        warn!(error = %err, "failed to release leader lock on shutdown");
                    }
                    info!(holder_id = %self.holder_id, "tick scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Attempt exactly one tick.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::LockLost`] if the lock could not be renewed
    /// before commit, [`TickError::Timeout`] if the computation overran
    /// its limit, and [`TickError::Storage`] for exhausted backend
    /// retries. In every error case nothing was committed and the tick id
    /// was not consumed.
    pub async fn run_once(&self) -> Result<TickOutcome, TickError> {
        let ttl = Duration::from_millis(self.config.lock_ttl_ms);
        let acquired = retry_lock_op("acquire", LOCK_RETRY_ATTEMPTS, LOCK_RETRY_BASE_DELAY, || {
            self.lock.acquire(&self.holder_id, ttl)
        })
        .await
        .map_err(|err| TickError::Storage(err.to_string()))?;
        if acquired.is_none() {
            return Ok(TickOutcome::Skipped);
        }

        let tick_id = self.audit.last_tick_id().await.saturating_add(1);
        let seed = tick_seed(tick_id);
        let started_at = Utc::now();

        // Snapshot and compute under the time limit; the commit below is
        // deliberately outside it so a committed tick is never half done.
        let limit = Duration::from_millis(self.config.max_duration_ms);
        let computed = tokio::time::timeout(limit, async {
            let snapshot = self.store.snapshot().await;
            let next = spread::compute(&snapshot, &self.graph, seed, &self.spread);
            (snapshot, next)
        })
        .await;
        let Ok((snapshot, computed)) = computed else {
            return Err(TickError::Timeout {
                limit_ms: self.config.max_duration_ms,
            });
        };

        // Still the leader? Renewing here also covers the commit window.
        match retry_lock_op("renew", LOCK_RETRY_ATTEMPTS, LOCK_RETRY_BASE_DELAY, || {
            self.lock.renew(&self.holder_id, ttl)
        })
        .await
        {
            Ok(()) => {}
            Err(LockError::Lost) => return Err(TickError::LockLost),
            Err(err) => return Err(TickError::Storage(err.to_string())),
        }

        // Reserve the audit slot before touching live state. If the id is
        // stale the wake aborts here with nothing mutated; once the slot
        // is held, the swap below and the append cannot be separated.
        let txn = self
            .audit
            .begin_tick(tick_id)
            .await
            .map_err(|err| TickError::Storage(err.to_string()))?;

        let ended_at = Utc::now();
        let diff = self
            .store
            .commit_tick(
                tick_id,
                &snapshot,
                &computed,
                self.spread.resistance_drift,
                self.config.diff_epsilon_bps,
                ended_at,
            )
            .await;

        let levels = self.store.levels().await;
        let stats = TickStats {
            regions_total: u32::try_from(levels.len()).unwrap_or(u32::MAX),
            regions_changed: u32::try_from(diff.len()).unwrap_or(u32::MAX),
            total_infection_bps: levels
                .values()
                .fold(0_u64, |acc, level| acc.saturating_add(u64::from(*level))),
            actions_since_last: txn.actions_applied_at(tick_id),
        };
        let record = TickRecord {
            tick_id,
            seed,
            started_at,
            ended_at,
            diff: diff.clone(),
            stats,
        };

        txn.commit(record.clone());

        let subscribers = self.broadcaster.publish(TickDiff {
            tick_id,
            entries: diff,
        });
        debug!(tick_id, subscribers, "tick diff published");

        Ok(TickOutcome::Committed(record))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use pandemos_model::topology::RegionCatalogEntry;
    use pandemos_types::RegionId;

    use crate::lock::LocalLeaderLock;

    use super::*;

    fn catalog() -> Vec<RegionCatalogEntry> {
        vec![
            RegionCatalogEntry {
                region_id: RegionId::from("a"),
                neighbors: vec![RegionId::from("b")],
                initial_infection_bps: 2_000,
            },
            RegionCatalogEntry {
                region_id: RegionId::from("b"),
                neighbors: vec![RegionId::from("a")],
                initial_infection_bps: 500,
            },
        ]
    }

    fn scheduler(lock: Arc<LocalLeaderLock>, holder_id: &str) -> TickScheduler<LocalLeaderLock> {
        let entries = catalog();
        let graph = Arc::new(RegionGraph::from_catalog(&entries).unwrap());
        let store = Arc::new(RegionStateStore::bootstrap(&entries, &[]));
        TickScheduler::new(
            lock,
            store,
            Arc::new(AuditLog::new("s")),
            DiffBroadcaster::new(),
            graph,
            TickConfig::default(),
            SpreadParams::default(),
            holder_id,
        )
    }

    #[tokio::test]
    async fn ticks_commit_with_gapless_ids() {
        let sched = scheduler(Arc::new(LocalLeaderLock::new()), "node-1");

        for expected in 1..=3_u64 {
            let outcome = sched.run_once().await.unwrap();
            let TickOutcome::Committed(record) = outcome else {
                panic!("expected a committed tick");
            };
            assert_eq!(record.tick_id, expected);
            assert_eq!(record.seed, tick_seed(expected));
        }
        assert_eq!(sched.audit.last_tick_id().await, 3);
    }

    #[tokio::test]
    async fn committed_diffs_reach_subscribers() {
        let sched = scheduler(Arc::new(LocalLeaderLock::new()), "node-1");
        let mut rx = sched.broadcaster.subscribe();

        let _ = sched.run_once().await.unwrap();
        let diff = rx.recv().await.unwrap();
        assert_eq!(diff.tick_id, 1);
        assert!(!diff.entries.is_empty());
    }

    #[tokio::test]
    async fn contended_wake_skips_without_consuming_an_id() {
        let lock = Arc::new(LocalLeaderLock::new());
        let leader = scheduler(Arc::clone(&lock), "leader");
        let standby = scheduler(Arc::clone(&lock), "standby");

        let _ = leader.run_once().await.unwrap();
        assert_eq!(standby.run_once().await.unwrap(), TickOutcome::Skipped);

        // The leader's next tick is still the direct successor.
        let TickOutcome::Committed(record) = leader.run_once().await.unwrap() else {
            panic!("expected a committed tick");
        };
        assert_eq!(record.tick_id, 2);
        assert_eq!(standby.audit.last_tick_id().await, 0);
    }

    /// Grants acquisition but reports the lock stolen at renewal time,
    /// as happens when a rival takes over after our TTL lapses mid-tick.
    #[derive(Debug, Default)]
    struct StolenLock;

    impl LeaderLock for StolenLock {
        async fn acquire(&self, _: &str, _: Duration) -> Result<Option<u64>, LockError> {
            Ok(Some(1))
        }

        async fn renew(&self, _: &str, _: Duration) -> Result<(), LockError> {
            Err(LockError::Lost)
        }

        async fn release(&self, _: &str) -> Result<(), LockError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lost_lock_aborts_before_commit() {
        let entries = catalog();
        let graph = Arc::new(RegionGraph::from_catalog(&entries).unwrap());
        let store = Arc::new(RegionStateStore::bootstrap(&entries, &[]));
        let sched = TickScheduler::new(
            Arc::new(StolenLock),
            store,
            Arc::new(AuditLog::new("s")),
            DiffBroadcaster::new(),
            graph,
            TickConfig::default(),
            SpreadParams::default(),
            "leader",
        );

        assert_eq!(sched.run_once().await, Err(TickError::LockLost));
        assert_eq!(sched.audit.last_tick_id().await, 0);
        let a = sched.store.get(&RegionId::from("a")).await.unwrap();
        assert_eq!(a.last_tick, 0);
        assert_eq!(a.infection_level, 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn overlong_tick_times_out_without_commit() {
        let lock = Arc::new(LocalLeaderLock::new());
        let mut sched = scheduler(Arc::clone(&lock), "leader");
        sched.config.max_duration_ms = 20;

        // Hold one region's write lock long enough to stall the snapshot
        // past the limit.
        let store = Arc::clone(&sched.store);
        let blocker = tokio::spawn(async move {
            store
                .with_region_mut(&RegionId::from("a"), |_| {
                    std::thread::sleep(Duration::from_millis(200));
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = sched.run_once().await;
        assert_eq!(result, Err(TickError::Timeout { limit_ms: 20 }));
        assert_eq!(sched.audit.last_tick_id().await, 0);

        blocker.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stale_tick_id_aborts_with_no_state_change() {
        let sched = Arc::new(scheduler(Arc::new(LocalLeaderLock::new()), "leader"));

        // Stall the snapshot so a rival record can land between the id
        // read and the append reservation.
        let store = Arc::clone(&sched.store);
        let blocker = tokio::spawn(async move {
            store
                .with_region_mut(&RegionId::from("a"), |_| {
                    std::thread::sleep(Duration::from_millis(150));
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let runner = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        sched
            .audit
            .append_tick(TickRecord {
                tick_id: 1,
                seed: tick_seed(1),
                started_at: Utc::now(),
                ended_at: Utc::now(),
                diff: vec![],
                stats: TickStats::default(),
            })
            .await
            .unwrap();
        blocker.await.unwrap().unwrap();

        let result = runner.await.unwrap();
        assert!(matches!(result, Err(TickError::Storage(_))));

        // The rival's record is the only commit; no level moved.
        assert_eq!(sched.audit.last_tick_id().await, 1);
        let a = sched.store.get(&RegionId::from("a")).await.unwrap();
        assert_eq!(a.last_tick, 0);
        assert_eq!(a.infection_level, 2_000);
    }

    #[tokio::test]
    async fn identical_histories_replay_identically() {
        let first = scheduler(Arc::new(LocalLeaderLock::new()), "n1");
        let second = scheduler(Arc::new(LocalLeaderLock::new()), "n2");

        for _ in 0..3 {
            let _ = first.run_once().await.unwrap();
            let _ = second.run_once().await.unwrap();
        }

        assert_eq!(first.store.levels().await, second.store.levels().await);
    }

    #[tokio::test]
    async fn shutdown_releases_the_lock() {
        let lock = Arc::new(LocalLeaderLock::new());
        let sched = Arc::new(scheduler(Arc::clone(&lock), "leader"));
        let (tx, rx) = watch::channel(false);

        let runner = {
            let sched = Arc::clone(&sched);
            tokio::spawn(async move { sched.run(rx).await })
        };
        // Let the first wake take the lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        runner.await.unwrap();

        let reclaimed = lock.acquire("other", Duration::from_secs(1)).await.unwrap();
        assert!(reclaimed.is_some());
    }
}
