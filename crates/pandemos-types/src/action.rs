//! Intervention payloads, audit records, and receipts.
//!
//! A `Mix` is the composition a player submits against one region: named
//! compounds with percentage shares in basis points that must sum to
//! [`MIX_TOTAL_BPS`]. The evaluated result is recorded once per `ref_id`
//! (the caller-supplied idempotency key) and replayed verbatim on retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{CompoundId, PlayerId, RegionId};

/// Required sum of mix component shares, in basis points (100%).
pub const MIX_TOTAL_BPS: u32 = 10_000;

/// One component of a mix: a registered compound and its share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MixComponent {
    /// The compound, which must exist in the static registry.
    pub compound_id: CompoundId,
    /// This component's share of the mix, in basis points.
    pub share_bps: u32,
}

/// A composition of named compounds submitted as an intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Mix {
    /// Ordered component list; shares must sum to [`MIX_TOTAL_BPS`].
    pub components: Vec<MixComponent>,
}

impl Mix {
    /// Sum of all component shares in basis points. Saturates instead of
    /// overflowing so a malicious payload cannot wrap the total.
    pub fn total_share_bps(&self) -> u32 {
        self.components
            .iter()
            .fold(0_u32, |acc, c| acc.saturating_add(c.share_bps))
    }
}

/// The outcome of an evaluated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ActionOutcome {
    /// The score cleared the threshold; a bounded negative delta applied.
    Success,
    /// The score fell short; a small positive delta and a minor
    /// resistance increase applied.
    Fail,
}

/// An intervention request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionRequest {
    /// Caller-supplied idempotency key. Retries with the same key return
    /// the stored receipt without re-evaluation.
    pub ref_id: String,
    /// The submitting player.
    pub player_id: PlayerId,
    /// The target region.
    pub region_id: RegionId,
    /// The submitted composition.
    pub mix: Mix,
}

/// The immutable audit record of one evaluated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionRecord {
    /// Caller-supplied idempotency key, unique across the log.
    pub ref_id: String,
    /// The submitting player.
    pub player_id: PlayerId,
    /// The target region.
    pub region_id: RegionId,
    /// The submitted composition.
    pub mix: Mix,
    /// When the action was accepted for evaluation.
    pub submitted_at: DateTime<Utc>,
    /// The tick id current when the delta applied.
    pub tick_applied: u64,
    /// Evaluated outcome.
    pub outcome: ActionOutcome,
    /// The bounded delta applied to the region, in basis points.
    pub delta_applied: i32,
    /// The region's infection level after the delta.
    pub new_infection_level: u16,
    /// Hex SHA-256 over the record payload plus a server-held secret.
    /// Verifiable by the operator, not forgeable by submitters.
    pub proof: String,
}

/// The synchronous reply to an action submission.
///
/// Identical retries of the same `ref_id` receive a bit-identical receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionReceipt {
    /// Always true for an evaluated action; validation failures are
    /// reported as errors instead.
    pub ok: bool,
    /// The tick id current when the delta applied.
    pub tick_id: u64,
    /// Evaluated outcome.
    pub outcome: ActionOutcome,
    /// The bounded delta applied, in basis points.
    pub delta_applied: i32,
    /// The region's infection level after the delta.
    pub new_infection_level: u16,
}

impl ActionReceipt {
    /// Build the receipt stored in and replayed from an audit record.
    pub const fn from_record(record: &ActionRecord) -> Self {
        Self {
            ok: true,
            tick_id: record.tick_applied,
            outcome: record.outcome,
            delta_applied: record.delta_applied,
            new_infection_level: record.new_infection_level,
        }
    }
}

/// Per-player rate limiting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    /// The rate-limited player.
    pub player_id: PlayerId,
    /// Earliest time the player may submit again.
    pub next_allowed_at: DateTime<Utc>,
    /// Number of submissions in the current window.
    pub window_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mix(shares: &[u32]) -> Mix {
        Mix {
            components: shares
                .iter()
                .enumerate()
                .map(|(i, share)| MixComponent {
                    compound_id: CompoundId::new(format!("c{i}")),
                    share_bps: *share,
                })
                .collect(),
        }
    }

    #[test]
    fn total_share_sums_components() {
        assert_eq!(mix(&[5_000, 3_000, 2_000]).total_share_bps(), MIX_TOTAL_BPS);
    }

    #[test]
    fn total_share_saturates() {
        assert_eq!(mix(&[u32::MAX, u32::MAX]).total_share_bps(), u32::MAX);
    }

    #[test]
    fn receipt_mirrors_record() {
        let record = ActionRecord {
            ref_id: "r-1".to_owned(),
            player_id: PlayerId::new(),
            region_id: RegionId::from("r1"),
            mix: mix(&[MIX_TOTAL_BPS]),
            submitted_at: Utc::now(),
            tick_applied: 7,
            outcome: ActionOutcome::Success,
            delta_applied: -250,
            new_infection_level: 1_070,
            proof: String::new(),
        };
        let receipt = ActionReceipt::from_record(&record);
        assert!(receipt.ok);
        assert_eq!(receipt.tick_id, 7);
        assert_eq!(receipt.delta_applied, -250);
        assert_eq!(receipt.new_infection_level, 1_070);
    }
}
