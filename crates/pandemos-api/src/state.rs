//! Shared application state for the gateway API server.
//!
//! [`AppState`] holds the live core components the handlers serve from:
//! the region state store, the audit log, the action evaluator, and the
//! diff broadcaster. Reads go straight to the in-process store, so a
//! snapshot query never blocks the tick cycle for longer than one brief
//! read lock per region.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use pandemos_core::{ActionEvaluator, AuditLog, DiffBroadcaster, RegionStateStore};
use pandemos_types::{TickDiff, WorldSnapshot};

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor. All
/// fields are themselves shared handles, so cloning the state is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The canonical region state store.
    pub store: Arc<RegionStateStore>,
    /// The append-only tick and action history.
    pub audit: Arc<AuditLog>,
    /// The idempotent action evaluator.
    pub evaluator: Arc<ActionEvaluator>,
    /// Fan-out channel for committed tick diffs.
    pub broadcaster: DiffBroadcaster,
}

impl AppState {
    /// Create the application state from the core components.
    pub const fn new(
        store: Arc<RegionStateStore>,
        audit: Arc<AuditLog>,
        evaluator: Arc<ActionEvaluator>,
        broadcaster: DiffBroadcaster,
    ) -> Self {
        Self {
            store,
            audit,
            evaluator,
            broadcaster,
        }
    }

    /// Build a full world snapshot from the live store.
    pub async fn world_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick_id: self.audit.last_tick_id().await,
            updated_at: Utc::now(),
            regions: self.store.levels().await,
        }
    }

    /// Subscribe to the tick diff stream.
    ///
    /// Returns a receiver that yields one [`TickDiff`] per committed
    /// tick, starting from the next commit.
    pub fn subscribe(&self) -> broadcast::Receiver<TickDiff> {
        self.broadcaster.subscribe()
    }
}
