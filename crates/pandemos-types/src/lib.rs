//! Shared type definitions for the Pandemos contagion service.
//!
//! This crate is the single source of truth for all types that cross crate
//! boundaries in the Pandemos workspace. Wire-facing types flow downstream
//! to `TypeScript` via `ts-rs` for dashboard clients.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (players, regions, compounds)
//! - [`region`] -- Live region state and full snapshots
//! - [`tick`] -- Committed tick records, diffs, and stats
//! - [`action`] -- Intervention payloads, audit records, and receipts

pub mod action;
pub mod ids;
pub mod region;
pub mod tick;

// Re-export all public types at crate root for convenience.
pub use action::{
    ActionOutcome, ActionReceipt, ActionRecord, ActionRequest, CooldownState, MIX_TOTAL_BPS, Mix,
    MixComponent,
};
pub use ids::{CompoundId, PlayerId, RegionId};
pub use region::{MAX_INFECTION_BPS, RegionState, WorldSnapshot};
pub use tick::{DiffEntry, TickDiff, TickRecord, TickStats};

#[cfg(test)]
mod tests {
    //! Integration tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes TypeScript bindings for #[ts(export)] types to the
        // bindings/ directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::PlayerId::export_all();
        let _ = crate::ids::RegionId::export_all();
        let _ = crate::ids::CompoundId::export_all();
        let _ = crate::region::RegionState::export_all();
        let _ = crate::region::WorldSnapshot::export_all();
        let _ = crate::tick::TickRecord::export_all();
        let _ = crate::tick::TickDiff::export_all();
        let _ = crate::action::ActionRequest::export_all();
        let _ = crate::action::ActionRecord::export_all();
        let _ = crate::action::ActionReceipt::export_all();
    }
}
