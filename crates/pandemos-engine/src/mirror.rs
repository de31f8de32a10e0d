//! Background mirroring of committed state to external storage.
//!
//! Subscribes to the tick diff stream and, after each commit, writes the
//! current region levels to Redis and the newly committed tick record to
//! `PostgreSQL`. Action records are drained from the audit log through a
//! high-water cursor that only advances past confirmed inserts, so every
//! record reaches the history tables at least once even when a write
//! fails or the task lags behind the stream. The tick cycle itself never
//! waits on any of it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pandemos_core::{AuditLog, DiffBroadcaster, RegionStateStore};
use pandemos_db::{AuditStore, PostgresPool, RedisPool};
use pandemos_types::WorldSnapshot;

/// Spawn the mirror task. It runs until the diff channel closes.
pub fn spawn(
    broadcaster: &DiffBroadcaster,
    store: Arc<RegionStateStore>,
    audit: Arc<AuditLog>,
    redis: RedisPool,
    postgres: PostgresPool,
) -> JoinHandle<()> {
    let mut rx = broadcaster.subscribe();
    tokio::spawn(async move {
        info!("state mirror started");
        let audit_store = AuditStore::new(postgres.pool());
        let mut cursor = 0_usize;
        loop {
            match rx.recv().await {
                Ok(diff) => {
                    cursor =
                        mirror_tick(diff.tick_id, cursor, &store, &audit, &redis, &audit_store)
                            .await;
                }
                Err(RecvError::Lagged(n)) => {
                    // Snapshots mirror the full current state and the
                    // action cursor is untouched, so nothing is lost.
                    warn!(skipped = n, "mirror lagged behind the diff stream");
                }
                Err(RecvError::Closed) => {
                    info!("diff channel closed, state mirror stopping");
                    return;
                }
            }
        }
    })
}

/// Mirror one committed tick: levels to Redis, records to `PostgreSQL`.
/// Returns the advanced action cursor, one past the last confirmed
/// insert; a failed insert stops the drain so the record is retried on
/// the next pass.
async fn mirror_tick(
    tick_id: u64,
    mut cursor: usize,
    store: &RegionStateStore,
    audit: &AuditLog,
    redis: &RedisPool,
    audit_store: &AuditStore<'_>,
) -> usize {
    let snapshot = WorldSnapshot {
        tick_id,
        updated_at: Utc::now(),
        regions: store.levels().await,
    };
    if let Err(e) = redis.mirror_snapshot(&snapshot).await {
        warn!(tick_id, error = %e, "failed to mirror snapshot to Redis");
    }

    for record in audit.recent_ticks(1).await {
        if record.tick_id != tick_id {
            continue;
        }
        if let Err(e) = audit_store.insert_tick(&record).await {
            warn!(tick_id, error = %e, "failed to mirror tick record");
        }
    }

    for record in audit.actions_from(cursor).await {
        if let Err(e) = audit_store.insert_action(&record).await {
            warn!(ref_id = %record.ref_id, error = %e, "failed to mirror action record");
            break;
        }
        cursor = cursor.saturating_add(1);
    }

    debug!(tick_id, cursor, "mirrored committed state");
    cursor
}
