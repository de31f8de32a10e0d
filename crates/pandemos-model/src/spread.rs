//! The deterministic spread model: one simultaneous global update per tick.
//!
//! [`compute`] is a pure function of `(snapshot, graph, seed, params)`.
//! Every region's next value derives solely from the snapshot taken before
//! the tick began; no region ever observes another region's value updated
//! in the same tick. All arithmetic is [`Decimal`] fixed point, so
//! identical inputs produce byte-identical output on every process --
//! committed ticks replay exactly from the audit log.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use pandemos_types::{MAX_INFECTION_BPS, RegionId, RegionState};

use crate::seed::region_fraction;
use crate::topology::RegionGraph;

/// Tuning parameters for the spread model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpreadParams {
    /// Self-growth fraction applied to a region's own level each tick.
    #[serde(default = "default_growth_rate")]
    pub growth_rate: Decimal,

    /// Fraction of the mean neighbor level added as inbound pressure.
    #[serde(default = "default_neighbor_coupling")]
    pub neighbor_coupling: Decimal,

    /// Decay fraction scaled by the region's mean resistance.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: Decimal,

    /// Fraction by which recorded resistance fades each tick.
    #[serde(default = "default_resistance_drift")]
    pub resistance_drift: Decimal,

    /// Maximum absolute seeded jitter per region, in basis points.
    #[serde(default = "default_jitter_bps")]
    pub jitter_bps: u32,
}

fn default_growth_rate() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_neighbor_coupling() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_decay_rate() -> Decimal {
    Decimal::new(8, 2) // 0.08
}

fn default_resistance_drift() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

const fn default_jitter_bps() -> u32 {
    8
}

impl Default for SpreadParams {
    fn default() -> Self {
        Self {
            growth_rate: default_growth_rate(),
            neighbor_coupling: default_neighbor_coupling(),
            decay_rate: default_decay_rate(),
            resistance_drift: default_resistance_drift(),
            jitter_bps: default_jitter_bps(),
        }
    }
}

/// Compute the next infection level for every region.
///
/// Per region: a self-growth term, a neighbor-pressure term weighted by
/// neighbors' previous-tick values only, a decay term derived from mean
/// resistance, and a seeded jitter, clamped to `[0, 10000]`.
pub fn compute(
    snapshot: &BTreeMap<RegionId, RegionState>,
    graph: &RegionGraph,
    seed: u64,
    params: &SpreadParams,
) -> BTreeMap<RegionId, u16> {
    snapshot
        .iter()
        .map(|(region_id, state)| {
            let next = next_level(state, snapshot, graph, seed, params);
            (region_id.clone(), next)
        })
        .collect()
}

/// Compute one region's next level from the pre-tick snapshot.
fn next_level(
    state: &RegionState,
    snapshot: &BTreeMap<RegionId, RegionState>,
    graph: &RegionGraph,
    seed: u64,
    params: &SpreadParams,
) -> u16 {
    let level = Decimal::from(state.infection_level);

    let growth = level * params.growth_rate;
    let pressure = neighbor_pressure(&state.region_id, snapshot, graph, params);
    let decay = level * params.decay_rate * state.mean_resistance();
    let jitter = seeded_jitter(seed, &state.region_id, params.jitter_bps);

    let next = level + growth + pressure - decay + jitter;
    let clamped = next.clamp(Decimal::ZERO, Decimal::from(MAX_INFECTION_BPS));
    clamped.round().to_u16().unwrap_or(MAX_INFECTION_BPS)
}

/// Mean previous-tick level of the region's neighbors, scaled by the
/// coupling factor. Zero for isolated regions.
fn neighbor_pressure(
    region_id: &RegionId,
    snapshot: &BTreeMap<RegionId, RegionState>,
    graph: &RegionGraph,
    params: &SpreadParams,
) -> Decimal {
    let neighbors = graph.neighbors(region_id);
    if neighbors.is_empty() {
        return Decimal::ZERO;
    }

    let sum: Decimal = neighbors
        .iter()
        .filter_map(|n| snapshot.get(n))
        .map(|s| Decimal::from(s.infection_level))
        .sum();
    let mean = sum
        .checked_div(Decimal::from(neighbors.len()))
        .unwrap_or(Decimal::ZERO);
    mean * params.neighbor_coupling
}

/// Seeded jitter in `[-jitter_bps, +jitter_bps]`, a pure function of the
/// tick seed and the region id.
fn seeded_jitter(seed: u64, region_id: &RegionId, jitter_bps: u32) -> Decimal {
    if jitter_bps == 0 {
        return Decimal::ZERO;
    }
    let centered = region_fraction(seed, region_id) * Decimal::TWO - Decimal::ONE;
    centered * Decimal::from(jitter_bps)
}

/// Fade a resistance vector by the drift fraction, flooring at zero.
///
/// Applied at tick commit so deploy-granted resistance decays over time;
/// the spread computation itself stays side-effect free.
pub fn drift_resistance(
    resistance: &BTreeMap<String, Decimal>,
    drift: Decimal,
) -> BTreeMap<String, Decimal> {
    let keep = (Decimal::ONE - drift).max(Decimal::ZERO);
    resistance
        .iter()
        .map(|(tag, value)| (tag.clone(), (*value * keep).max(Decimal::ZERO)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::topology::RegionCatalogEntry;

    fn chain_graph() -> RegionGraph {
        let entries = vec![
            RegionCatalogEntry {
                region_id: RegionId::from("a"),
                neighbors: vec![RegionId::from("b")],
                initial_infection_bps: 0,
            },
            RegionCatalogEntry {
                region_id: RegionId::from("b"),
                neighbors: vec![RegionId::from("a"), RegionId::from("c")],
                initial_infection_bps: 0,
            },
            RegionCatalogEntry {
                region_id: RegionId::from("c"),
                neighbors: vec![RegionId::from("b")],
                initial_infection_bps: 0,
            },
        ];
        RegionGraph::from_catalog(&entries).unwrap()
    }

    fn snapshot(levels: &[(&str, u16)]) -> BTreeMap<RegionId, RegionState> {
        levels
            .iter()
            .map(|(id, level)| {
                let region_id = RegionId::from(*id);
                (
                    region_id.clone(),
                    RegionState::bootstrap(region_id, *level, &[]),
                )
            })
            .collect()
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let graph = chain_graph();
        let snap = snapshot(&[("a", 1_320), ("b", 4_400), ("c", 90)]);
        let params = SpreadParams::default();

        let first = compute(&snap, &graph, 42, &params);
        let second = compute(&snap, &graph, 42, &params);
        assert_eq!(first, second);
    }

    #[test]
    fn output_stays_within_scale() {
        let graph = chain_graph();
        let snap = snapshot(&[("a", 10_000), ("b", 10_000), ("c", 0)]);
        let params = SpreadParams {
            growth_rate: Decimal::ONE,
            neighbor_coupling: Decimal::ONE,
            decay_rate: Decimal::ZERO,
            resistance_drift: Decimal::ZERO,
            jitter_bps: 500,
        };

        let next = compute(&snap, &graph, 7, &params);
        for level in next.values() {
            assert!(*level <= MAX_INFECTION_BPS);
        }
    }

    #[test]
    fn next_values_derive_from_snapshot_only() {
        // Middle region's next value must match a hand computation from
        // the pre-tick snapshot, regardless of what its neighbors compute
        // this tick.
        let graph = chain_graph();
        let snap = snapshot(&[("a", 2_000), ("b", 1_000), ("c", 4_000)]);
        let params = SpreadParams {
            growth_rate: Decimal::new(10, 2), // 0.10
            neighbor_coupling: Decimal::new(20, 2), // 0.20
            decay_rate: Decimal::ZERO,
            resistance_drift: Decimal::ZERO,
            jitter_bps: 0,
        };

        let next = compute(&snap, &graph, 1, &params);
        // b: 1000 + 1000*0.10 + mean(2000, 4000)*0.20 = 1000 + 100 + 600
        assert_eq!(next.get(&RegionId::from("b")).copied(), Some(1_700));
        // a: 2000 + 200 + 1000*0.20 = 2400 (reads b's OLD value, not 1700)
        assert_eq!(next.get(&RegionId::from("a")).copied(), Some(2_400));
    }

    #[test]
    fn isolated_region_feels_no_pressure() {
        let entries = vec![RegionCatalogEntry {
            region_id: RegionId::from("solo"),
            neighbors: vec![],
            initial_infection_bps: 0,
        }];
        let graph = RegionGraph::from_catalog(&entries).unwrap();
        let snap = snapshot(&[("solo", 1_000)]);
        let params = SpreadParams {
            growth_rate: Decimal::ZERO,
            neighbor_coupling: Decimal::ONE,
            decay_rate: Decimal::ZERO,
            resistance_drift: Decimal::ZERO,
            jitter_bps: 0,
        };

        let next = compute(&snap, &graph, 3, &params);
        assert_eq!(next.get(&RegionId::from("solo")).copied(), Some(1_000));
    }

    #[test]
    fn resistance_slows_growth() {
        let graph = chain_graph();
        let mut resistant = snapshot(&[("a", 5_000), ("b", 0), ("c", 0)]);
        if let Some(state) = resistant.get_mut(&RegionId::from("a")) {
            state.resistance.insert("viral".to_owned(), Decimal::ONE);
        }
        let plain = snapshot(&[("a", 5_000), ("b", 0), ("c", 0)]);
        let params = SpreadParams {
            jitter_bps: 0,
            ..SpreadParams::default()
        };

        let with_resistance = compute(&resistant, &graph, 9, &params);
        let without = compute(&plain, &graph, 9, &params);
        let a = RegionId::from("a");
        assert!(with_resistance.get(&a).copied() < without.get(&a).copied());
    }

    #[test]
    fn drift_fades_resistance_toward_zero() {
        let mut resistance = BTreeMap::new();
        resistance.insert("viral".to_owned(), Decimal::new(5, 1)); // 0.5
        let drifted = drift_resistance(&resistance, Decimal::new(1, 1)); // 0.1
        assert_eq!(
            drifted.get("viral").copied(),
            Some(Decimal::new(45, 2)) // 0.45
        );
    }

    #[test]
    fn jitter_is_bounded_and_seed_stable() {
        let region = RegionId::from("a");
        let bound = Decimal::from(8_u32);
        let j = seeded_jitter(42, &region, 8);
        assert!(j >= -bound && j <= bound);
        assert_eq!(j, seeded_jitter(42, &region, 8));
    }
}
