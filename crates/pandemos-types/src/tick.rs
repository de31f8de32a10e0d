//! Tick records: one immutable entry per committed global state advance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::RegionId;

/// One region's new level inside a tick diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DiffEntry {
    /// The region whose level changed beyond the diff epsilon.
    pub region_id: RegionId,
    /// The region's new infection level in basis points.
    pub infection_level: u16,
}

/// Aggregate counts for a committed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickStats {
    /// Total number of regions in the topology.
    pub regions_total: u32,
    /// Number of regions whose change exceeded the diff epsilon.
    pub regions_changed: u32,
    /// Sum of all infection levels after the tick, in basis points.
    pub total_infection_bps: u64,
    /// Actions applied since the previous committed tick.
    pub actions_since_last: u32,
}

/// The broadcast payload pushed to every diff subscriber after a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickDiff {
    /// The committed tick this diff belongs to.
    pub tick_id: u64,
    /// Regions whose change exceeded the epsilon, ordered by region id.
    pub entries: Vec<DiffEntry>,
}

/// An immutable record of one committed tick.
///
/// Tick ids are monotonic and gapless on success: an aborted tick (lock
/// lost, timeout) consumes no id and the next wake retries the same one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TickRecord {
    /// Monotonic tick number.
    pub tick_id: u64,
    /// Seed used for this tick's deterministic randomness, derived from
    /// `tick_id` alone.
    pub seed: u64,
    /// When the tick computation began.
    pub started_at: DateTime<Utc>,
    /// When the tick committed.
    pub ended_at: DateTime<Utc>,
    /// Regions whose change exceeded the configured epsilon, ordered by
    /// region id.
    pub diff: Vec<DiffEntry>,
    /// Aggregate counts.
    pub stats: TickStats,
}
