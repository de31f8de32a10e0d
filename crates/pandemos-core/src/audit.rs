//! Append-only audit trail of committed ticks and evaluated actions.
//!
//! Records are never mutated or deleted after append. Tick records must
//! arrive in strict succession (each id exactly one past the last) and
//! every action record carries a keyed SHA-256 proof over its payload, so
//! an operator can verify the log but a submitter cannot forge entries.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, RwLockWriteGuard};

use pandemos_types::{ActionOutcome, ActionRecord, RegionId, TickRecord};

use crate::error::AuditError;

/// Domain separator for action proofs, versioned for future rotation.
const PROOF_DOMAIN: &str = "pandemos.proof.v1";

#[derive(Debug)]
struct AuditInner {
    ticks: Vec<TickRecord>,
    actions: Vec<ActionRecord>,
    by_ref: BTreeMap<String, usize>,
}

/// In-memory append-only log. The optional Postgres mirror in
/// `pandemos-db` follows the same insert-only discipline.
#[derive(Debug)]
pub struct AuditLog {
    secret: String,
    inner: RwLock<AuditInner>,
}

impl AuditLog {
    /// Create an empty log with the server-held proof secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            inner: RwLock::new(AuditInner {
                ticks: Vec::new(),
                actions: Vec::new(),
                by_ref: BTreeMap::new(),
            }),
        }
    }

    /// The id of the last committed tick, or 0 if none committed yet.
    pub async fn last_tick_id(&self) -> u64 {
        self.inner
            .read()
            .await
            .ticks
            .last()
            .map_or(0, |t| t.tick_id)
    }

    /// Append a committed tick record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::OutOfOrderTick`] unless `record.tick_id` is
    /// exactly one past the last appended tick id.
    pub async fn append_tick(&self, record: TickRecord) -> Result<(), AuditError> {
        let mut inner = self.inner.write().await;
        let last = inner.ticks.last().map_or(0, |t| t.tick_id);
        if record.tick_id != last.saturating_add(1) {
            return Err(AuditError::OutOfOrderTick {
                tick_id: record.tick_id,
                last,
            });
        }
        inner.ticks.push(record);
        Ok(())
    }

    /// Reserve the append slot for `tick_id`, validating succession up
    /// front. The returned guard keeps the log write-locked until the
    /// record is committed or the guard is dropped, so a caller can make
    /// a state swap and the matching audit append succeed or fail
    /// together: once the slot is held, the append cannot be rejected.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::OutOfOrderTick`] unless `tick_id` is exactly
    /// one past the last appended tick id. On error nothing is held and
    /// nothing was written.
    pub async fn begin_tick(&self, tick_id: u64) -> Result<TickAppend<'_>, AuditError> {
        let inner = self.inner.write().await;
        let last = inner.ticks.last().map_or(0, |t| t.tick_id);
        if tick_id != last.saturating_add(1) {
            return Err(AuditError::OutOfOrderTick { tick_id, last });
        }
        Ok(TickAppend { inner })
    }

    /// Append an evaluated action record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::DuplicateRef`] if the `ref_id` is already
    /// recorded; the caller replays the stored receipt instead.
    pub async fn append_action(&self, record: ActionRecord) -> Result<(), AuditError> {
        let mut inner = self.inner.write().await;
        if inner.by_ref.contains_key(&record.ref_id) {
            return Err(AuditError::DuplicateRef(record.ref_id));
        }
        let index = inner.actions.len();
        inner.by_ref.insert(record.ref_id.clone(), index);
        inner.actions.push(record);
        Ok(())
    }

    /// Look up the stored record for an idempotency key.
    pub async fn find_action(&self, ref_id: &str) -> Option<ActionRecord> {
        let inner = self.inner.read().await;
        let index = inner.by_ref.get(ref_id).copied()?;
        inner.actions.get(index).cloned()
    }

    /// Number of actions applied during the given tick.
    pub async fn actions_applied_at(&self, tick_id: u64) -> u32 {
        let inner = self.inner.read().await;
        let count = inner
            .actions
            .iter()
            .filter(|a| a.tick_applied == tick_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Number of actions applied to one region during the given tick.
    /// Backs the per-region submission cap.
    pub async fn region_actions_at(&self, tick_id: u64, region_id: &RegionId) -> u32 {
        let inner = self.inner.read().await;
        let count = inner
            .actions
            .iter()
            .filter(|a| a.tick_applied == tick_id && a.region_id == *region_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// The most recent `limit` tick records, newest last.
    pub async fn recent_ticks(&self, limit: usize) -> Vec<TickRecord> {
        let inner = self.inner.read().await;
        let skip = inner.ticks.len().saturating_sub(limit);
        inner.ticks.iter().skip(skip).cloned().collect()
    }

    /// All action records, in append order. Used by tests; the
    /// in-memory log is the source of truth.
    pub async fn actions(&self) -> Vec<ActionRecord> {
        self.inner.read().await.actions.clone()
    }

    /// Action records from append index `start` onward, in append order.
    /// Backs the persistence mirror's high-water cursor: records are
    /// never reordered or removed, so an index identifies its record
    /// forever and a caller that advances only past confirmed writes
    /// revisits everything it has not confirmed.
    pub async fn actions_from(&self, start: usize) -> Vec<ActionRecord> {
        let inner = self.inner.read().await;
        inner.actions.iter().skip(start).cloned().collect()
    }

    /// Compute the keyed proof for an action's evaluated fields.
    pub fn action_proof(
        &self,
        ref_id: &str,
        tick_applied: u64,
        outcome: ActionOutcome,
        delta_applied: i32,
        new_infection_level: u16,
    ) -> String {
        let outcome_tag = match outcome {
            ActionOutcome::Success => "success",
            ActionOutcome::Fail => "fail",
        };
        let mut hasher = Sha256::new();
        hasher.update(PROOF_DOMAIN.as_bytes());
        hasher.update([0x1f]);
        hasher.update(ref_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(tick_applied.to_be_bytes());
        hasher.update(outcome_tag.as_bytes());
        hasher.update(delta_applied.to_be_bytes());
        hasher.update(new_infection_level.to_be_bytes());
        hasher.update([0x1f]);
        hasher.update(self.secret.as_bytes());
        hasher
            .finalize()
            .iter()
            .fold(String::with_capacity(64), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            })
    }

    /// Verify that a record's proof matches its fields under our secret.
    pub fn verify_proof(&self, record: &ActionRecord) -> bool {
        let expected = self.action_proof(
            &record.ref_id,
            record.tick_applied,
            record.outcome,
            record.delta_applied,
            record.new_infection_level,
        );
        expected == record.proof
    }
}

/// A reserved append slot returned by [`AuditLog::begin_tick`]. Holds the
/// log's write lock, so no other append can land between the reservation
/// and [`commit`](Self::commit); dropping it without committing leaves
/// the log untouched.
#[derive(Debug)]
pub struct TickAppend<'a> {
    inner: RwLockWriteGuard<'a, AuditInner>,
}

impl TickAppend<'_> {
    /// Number of recorded actions applied during the given tick, counted
    /// through the held guard.
    pub fn actions_applied_at(&self, tick_id: u64) -> u32 {
        let count = self
            .inner
            .actions
            .iter()
            .filter(|a| a.tick_applied == tick_id)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Write the reserved record. Infallible: succession was checked when
    /// the slot was reserved and the lock has been held since.
    pub fn commit(mut self, record: TickRecord) {
        self.inner.ticks.push(record);
    }
}
