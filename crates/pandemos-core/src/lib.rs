//! State-transition core for the Pandemos contagion service.
//!
//! Everything that advances or mutates global state lives here:
//!
//! - [`store`] -- per-region locked state, the single source of truth
//! - [`lock`] -- the leader lock guaranteeing one tick executor
//! - [`scheduler`] -- the tick loop: snapshot, spread, commit, publish
//! - [`evaluator`] -- validated, idempotent, bounded player actions
//! - [`audit`] -- the append-only history every mutation lands in
//! - [`broadcast`] -- non-blocking diff fan-out to subscribers
//! - [`config`] -- typed YAML configuration with env overrides
//! - [`error`] -- the error taxonomy shared by all of the above
//!
//! The `pandemos-api` crate exposes this over HTTP and `WebSocket`;
//! `pandemos-db` supplies the Redis-backed lock and optional persistence.

pub mod audit;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod lock;
pub mod scheduler;
pub mod store;

pub use audit::{AuditLog, TickAppend};
pub use broadcast::{BROADCAST_CAPACITY, DiffBroadcaster};
pub use config::{ActionConfig, AuditConfig, InfrastructureConfig, ServiceConfig, TickConfig};
pub use error::{ActionError, AuditError, LockError, TickError, ValidationError};
pub use evaluator::ActionEvaluator;
pub use lock::{LeaderLock, LocalLeaderLock};
pub use scheduler::{TickOutcome, TickScheduler};
pub use store::RegionStateStore;
