//! Region state: the single authoritative numeric value per region.
//!
//! Infection levels are stored as integer basis points (1/100 of a percent)
//! in the range `[0, 10000]`. Resistance is a per-tag attenuation vector in
//! `[0, 1]`, stored as [`Decimal`] so every computation over it is exact and
//! reproducible across processes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::RegionId;

/// Upper bound of the infection level scale, in basis points.
pub const MAX_INFECTION_BPS: u16 = 10_000;

/// The live state of a single region.
///
/// Created once per region at bootstrap from the static topology and never
/// deleted. Mutated only by the tick commit or by an action apply, both of
/// which hold the region's write lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RegionState {
    /// The region this state belongs to.
    pub region_id: RegionId,
    /// Current infection level in basis points, `0..=10000`.
    pub infection_level: u16,
    /// Per-tag attenuation factors in `[0, 1]`.
    #[ts(as = "BTreeMap<String, String>")]
    pub resistance: BTreeMap<String, Decimal>,
    /// The tick that last wrote this state.
    pub last_tick: u64,
    /// Wall-clock time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl RegionState {
    /// Create the bootstrap state for a region: the given starting level,
    /// zero resistance on every tag, last tick 0.
    pub fn bootstrap(region_id: RegionId, infection_level: u16, tags: &[String]) -> Self {
        let resistance = tags
            .iter()
            .map(|tag| (tag.clone(), Decimal::ZERO))
            .collect();
        Self {
            region_id,
            infection_level: infection_level.min(MAX_INFECTION_BPS),
            resistance,
            last_tick: 0,
            updated_at: Utc::now(),
        }
    }

    /// Mean resistance across all tags, or zero if no tags are tracked.
    pub fn mean_resistance(&self) -> Decimal {
        if self.resistance.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = self.resistance.values().copied().sum();
        let count = Decimal::from(self.resistance.len());
        sum.checked_div(count).unwrap_or(Decimal::ZERO)
    }
}

/// A full point-in-time view of all region levels, served to cold-starting
/// or reconnecting observers instead of diff replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WorldSnapshot {
    /// The last committed tick at the time of the snapshot.
    pub tick_id: u64,
    /// When the snapshot was taken.
    pub updated_at: DateTime<Utc>,
    /// Infection level per region, in basis points.
    pub regions: BTreeMap<RegionId, u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_clamps_to_scale() {
        let state = RegionState::bootstrap(RegionId::from("r1"), 20_000, &[]);
        assert_eq!(state.infection_level, MAX_INFECTION_BPS);
        assert_eq!(state.last_tick, 0);
    }

    #[test]
    fn bootstrap_zeroes_resistance_for_all_tags() {
        let tags = vec!["viral".to_owned(), "bacterial".to_owned()];
        let state = RegionState::bootstrap(RegionId::from("r1"), 100, &tags);
        assert_eq!(state.resistance.len(), 2);
        assert!(state.resistance.values().all(|v| *v == Decimal::ZERO));
    }

    #[test]
    fn mean_resistance_averages_tags() {
        let mut state = RegionState::bootstrap(RegionId::from("r1"), 100, &[]);
        state
            .resistance
            .insert("viral".to_owned(), Decimal::new(2, 1)); // 0.2
        state
            .resistance
            .insert("bacterial".to_owned(), Decimal::new(4, 1)); // 0.4
        assert_eq!(state.mean_resistance(), Decimal::new(3, 1)); // 0.3
    }

    #[test]
    fn mean_resistance_empty_is_zero() {
        let state = RegionState::bootstrap(RegionId::from("r1"), 100, &[]);
        assert_eq!(state.mean_resistance(), Decimal::ZERO);
    }
}
