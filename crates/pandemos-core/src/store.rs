//! The region state store: single source of truth for live region state.
//!
//! One lock per region, built once at bootstrap and never resized. Writes
//! to different regions proceed fully in parallel; writes to the same
//! region serialize on its lock, so two concurrent actions (or an action
//! racing a tick commit) never lose an update.
//!
//! The tick takes a clone-on-read snapshot that stays immutable for the
//! whole computation. At commit, each region's new value is merged as
//! `computed + (live - snapshot)` so a delta applied mid-tick survives the
//! commit and is visible to the next tick's snapshot -- the tick's own
//! already-taken snapshot is never retroactively altered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use pandemos_model::spread::drift_resistance;
use pandemos_model::topology::RegionCatalogEntry;
use pandemos_types::{DiffEntry, MAX_INFECTION_BPS, RegionId, RegionState};

/// Holds the canonical per-region state behind per-region locks.
#[derive(Debug)]
pub struct RegionStateStore {
    regions: BTreeMap<RegionId, RwLock<RegionState>>,
}

impl RegionStateStore {
    /// Create the store from the topology catalog, one region per entry,
    /// each starting at its catalog level with zero resistance on every
    /// registry tag.
    pub fn bootstrap(catalog: &[RegionCatalogEntry], tags: &[String]) -> Self {
        let regions = catalog
            .iter()
            .map(|entry| {
                let state = RegionState::bootstrap(
                    entry.region_id.clone(),
                    entry.initial_infection_bps,
                    tags,
                );
                (entry.region_id.clone(), RwLock::new(state))
            })
            .collect();
        Self { regions }
    }

    /// Number of regions in the store.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the store holds no regions.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Whether the region exists.
    pub fn contains(&self, region_id: &RegionId) -> bool {
        self.regions.contains_key(region_id)
    }

    /// Clone one region's current state.
    pub async fn get(&self, region_id: &RegionId) -> Option<RegionState> {
        match self.regions.get(region_id) {
            Some(lock) => Some(lock.read().await.clone()),
            None => None,
        }
    }

    /// Take a clone-on-read snapshot of every region.
    ///
    /// Each region is read-locked briefly in turn; the returned map is
    /// detached from the live store and stays immutable for the caller.
    pub async fn snapshot(&self) -> BTreeMap<RegionId, RegionState> {
        let mut out = BTreeMap::new();
        for (region_id, lock) in &self.regions {
            let state = lock.read().await.clone();
            out.insert(region_id.clone(), state);
        }
        out
    }

    /// Current infection level per region, for full snapshot queries.
    pub async fn levels(&self) -> BTreeMap<RegionId, u16> {
        let mut out = BTreeMap::new();
        for (region_id, lock) in &self.regions {
            let level = lock.read().await.infection_level;
            out.insert(region_id.clone(), level);
        }
        out
    }

    /// Run a closure against one region's state under its write lock.
    ///
    /// Returns `None` if the region does not exist. This is the only
    /// mutation path the action evaluator uses; holding the write lock
    /// across the read-modify-write makes each apply exactly-once.
    pub async fn with_region_mut<R>(
        &self,
        region_id: &RegionId,
        f: impl FnOnce(&mut RegionState) -> R,
    ) -> Option<R> {
        match self.regions.get(region_id) {
            Some(lock) => {
                let mut state = lock.write().await;
                Some(f(&mut state))
            }
            None => None,
        }
    }

    /// Commit a tick's computed values and return the resulting diff.
    ///
    /// For every region: merge `computed + (live - snapshot)` so deltas
    /// applied after the snapshot was taken are preserved, clamp to
    /// `[0, 10000]`, fade resistance by `drift`, and stamp `tick_id`.
    /// Regions whose merged level moved at least `epsilon_bps` from the
    /// snapshot appear in the diff, ordered by region id.
    pub async fn commit_tick(
        &self,
        tick_id: u64,
        snapshot: &BTreeMap<RegionId, RegionState>,
        computed: &BTreeMap<RegionId, u16>,
        drift: Decimal,
        epsilon_bps: u16,
        now: DateTime<Utc>,
    ) -> Vec<DiffEntry> {
        let mut diff = Vec::new();
        for (region_id, lock) in &self.regions {
            let snap_level = snapshot
                .get(region_id)
                .map_or(0, |s| s.infection_level);
            let computed_level = computed.get(region_id).copied().unwrap_or(snap_level);

            let mut state = lock.write().await;
            let merged = merge_levels(computed_level, snap_level, state.infection_level);
            state.infection_level = merged;
            state.resistance = drift_resistance(&state.resistance, drift);
            state.last_tick = tick_id;
            state.updated_at = now;
            drop(state);

            if merged.abs_diff(snap_level) >= epsilon_bps {
                diff.push(DiffEntry {
                    region_id: region_id.clone(),
                    infection_level: merged,
                });
            }
        }
        diff
    }
}

/// Merge a tick's computed level with deltas applied since the snapshot.
fn merge_levels(computed: u16, snapshot: u16, live: u16) -> u16 {
    let concurrent_delta = i64::from(live) - i64::from(snapshot);
    let merged = i64::from(computed).saturating_add(concurrent_delta);
    let clamped = merged.clamp(0, i64::from(MAX_INFECTION_BPS));
    u16::try_from(clamped).unwrap_or(MAX_INFECTION_BPS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog(levels: &[(&str, u16)]) -> Vec<RegionCatalogEntry> {
        levels
            .iter()
            .map(|(id, level)| RegionCatalogEntry {
                region_id: RegionId::from(*id),
                neighbors: vec![],
                initial_infection_bps: *level,
            })
            .collect()
    }

    #[tokio::test]
    async fn bootstrap_seeds_levels_and_tags() {
        let store = RegionStateStore::bootstrap(
            &catalog(&[("a", 1_320), ("b", 0)]),
            &["viral".to_owned()],
        );
        assert_eq!(store.len(), 2);
        let a = store.get(&RegionId::from("a")).await.unwrap();
        assert_eq!(a.infection_level, 1_320);
        assert_eq!(a.resistance.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_live_state() {
        let store = RegionStateStore::bootstrap(&catalog(&[("a", 100)]), &[]);
        let snap = store.snapshot().await;

        store
            .with_region_mut(&RegionId::from("a"), |state| {
                state.infection_level = 900;
            })
            .await
            .unwrap();

        assert_eq!(
            snap.get(&RegionId::from("a")).map(|s| s.infection_level),
            Some(100)
        );
        assert_eq!(
            store.get(&RegionId::from("a")).await.map(|s| s.infection_level),
            Some(900)
        );
    }

    #[tokio::test]
    async fn commit_preserves_delta_applied_after_snapshot() {
        let store = RegionStateStore::bootstrap(&catalog(&[("a", 1_000)]), &[]);
        let snap = store.snapshot().await;

        // An action lands after the snapshot but before the commit.
        store
            .with_region_mut(&RegionId::from("a"), |state| {
                state.infection_level = 800; // delta of -200
            })
            .await
            .unwrap();

        // The tick computed 1_100 from the snapshot value of 1_000.
        let mut computed = BTreeMap::new();
        computed.insert(RegionId::from("a"), 1_100_u16);

        let diff = store
            .commit_tick(1, &snap, &computed, Decimal::ZERO, 1, Utc::now())
            .await;

        // Merged: 1_100 + (800 - 1_000) = 900. The action is not lost.
        let a = store.get(&RegionId::from("a")).await.unwrap();
        assert_eq!(a.infection_level, 900);
        assert_eq!(a.last_tick, 1);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.first().map(|d| d.infection_level), Some(900));
    }

    #[tokio::test]
    async fn commit_filters_diff_by_epsilon() {
        let store = RegionStateStore::bootstrap(&catalog(&[("a", 1_000), ("b", 500)]), &[]);
        let snap = store.snapshot().await;

        let mut computed = BTreeMap::new();
        computed.insert(RegionId::from("a"), 1_050_u16); // moves 50
        computed.insert(RegionId::from("b"), 502_u16); // moves 2

        let diff = store
            .commit_tick(1, &snap, &computed, Decimal::ZERO, 10, Utc::now())
            .await;
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.first().map(|d| d.region_id.clone()), Some(RegionId::from("a")));
    }

    #[tokio::test]
    async fn merge_clamps_to_scale() {
        assert_eq!(merge_levels(10_000, 0, 500), MAX_INFECTION_BPS);
        assert_eq!(merge_levels(0, 500, 0), 0);
        assert_eq!(merge_levels(100, 200, 50), 0); // 100 - 150 floors at 0
    }

    #[tokio::test]
    async fn unknown_region_returns_none() {
        let store = RegionStateStore::bootstrap(&catalog(&[("a", 0)]), &[]);
        assert!(store.get(&RegionId::from("zz")).await.is_none());
        let result = store.with_region_mut(&RegionId::from("zz"), |_| ()).await;
        assert!(result.is_none());
    }
}
