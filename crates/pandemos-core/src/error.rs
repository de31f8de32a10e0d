//! Error taxonomy for the state-transition core.
//!
//! Request-facing errors ([`ActionError`]) surface to the submitting
//! caller with no state mutation. Tick-level faults ([`TickError`]) are
//! operational only: they delay or skip a tick, are logged, and are never
//! shown to end users. A duplicate `ref_id` is not an error at all -- the
//! evaluator replays the stored receipt.

use chrono::{DateTime, Utc};

use pandemos_types::{CompoundId, RegionId};

/// A malformed or illegal intervention request. No state is mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The target region does not exist in the topology.
    #[error("unknown region: {0}")]
    UnknownRegion(RegionId),

    /// A mix component references an unregistered compound.
    #[error("unknown compound: {0}")]
    UnknownCompound(CompoundId),

    /// The mix has no components.
    #[error("mix has no components")]
    EmptyMix,

    /// Component shares do not sum to the declared total.
    #[error("mix shares sum to {total_bps} bps, expected {expected_bps} (±{tolerance_bps})")]
    BadMixTotal {
        /// The actual sum of component shares.
        total_bps: u32,
        /// The required total.
        expected_bps: u32,
        /// The configured tolerance.
        tolerance_bps: u32,
    },

    /// The mix has more components than the configured maximum.
    #[error("mix has {count} components, maximum is {max}")]
    TooManyComponents {
        /// Number of components submitted.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The per-region per-tick submission cap was reached.
    #[error("region {region_id} reached its submission cap for tick {tick_id}")]
    RegionCapReached {
        /// The capped region.
        region_id: RegionId,
        /// The tick during which the cap applies.
        tick_id: u64,
    },
}

/// Errors returned synchronously to an action submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The request failed validation; nothing was mutated.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The player is rate limited; nothing was mutated.
    #[error("player is on cooldown until {retry_at}")]
    Cooldown {
        /// Earliest time the player may submit again.
        retry_at: DateTime<Utc>,
    },
}

/// Errors from a [`LeaderLock`](crate::lock::LeaderLock) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Another holder acquired the lock since our last renewal.
    #[error("leader lock lost to another holder")]
    Lost,

    /// A transient backend failure. Retried with backoff by callers;
    /// exhausted retries are treated as the lock being unavailable,
    /// never as the lock being held.
    #[error("leader lock storage error: {0}")]
    Storage(String),
}

/// Faults that abort a tick without partial effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// The leader lock was lost before commit; the tick aborted and the
    /// same tick id is retried on the next wake.
    #[error("leader lock lost before tick commit")]
    LockLost,

    /// The tick exceeded its maximum duration and was cancelled before
    /// commit.
    #[error("tick exceeded maximum duration of {limit_ms} ms")]
    Timeout {
        /// The configured limit in milliseconds.
        limit_ms: u64,
    },

    /// A storage operation failed after exhausting retries.
    #[error("tick storage error: {0}")]
    Storage(String),
}

/// Errors from the append-only audit log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// An action with this `ref_id` is already recorded.
    #[error("action with ref_id {0} already recorded")]
    DuplicateRef(String),

    /// A tick record arrived out of order.
    #[error("tick {tick_id} is not the successor of last committed tick {last}")]
    OutOfOrderTick {
        /// The rejected tick id.
        tick_id: u64,
        /// The last committed tick id.
        last: u64,
    },
}
